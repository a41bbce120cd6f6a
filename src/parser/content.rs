//! Content stream interpretation for text-showing operators.
//!
//! Tracks the text and line matrices through `BT`/`Td`/`Tm`/`T*`, and the
//! current transformation matrix through `q`/`Q`/`cm`. Emits one
//! [`ShownText`] per text-showing operator in default user space, tagged with
//! the operator's index so the annotation engine can rewrite exactly that
//! operation.

use std::collections::HashMap;

use super::backend::{get_number_from_value, BackendFontInfo, ContentOp, PageId, PdfBackend, PdfValue};

/// Kerning adjustment (thousandths of an em) treated as a word break in `TJ`.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Text painted by one content stream operator.
#[derive(Debug, Clone)]
pub struct ShownText {
    /// Index of the operator in the decoded content stream.
    pub op_index: usize,
    pub text: String,
    /// Start of the baseline in user space.
    pub x: f32,
    pub y: f32,
    /// Advance width in user space.
    pub width: f32,
    /// Effective font size in user space.
    pub font_size: f32,
    /// Base font name.
    pub font_name: String,
    /// Text matrix is rotated or skewed.
    pub rotated: bool,
}

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }
}

impl Matrix {
    fn translated(&self, tx: f32, ty: f32) -> Self {
        Self {
            e: self.e + tx * self.a + ty * self.c,
            f: self.f + tx * self.b + ty * self.d,
            ..*self
        }
    }

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Self {
        Self {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Length of the unit x vector.
    fn x_scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    /// Length of the unit y vector.
    fn y_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    fn is_rotated(&self) -> bool {
        self.b.abs() > f32::EPSILON || self.c.abs() > f32::EPSILON
    }
}

#[derive(Debug, Default)]
struct TextState {
    text: Matrix,
    line: Matrix,
    leading: f32,
    font_key: Vec<u8>,
    font_size: f32,
}

impl TextState {
    fn next_line(&mut self) {
        self.line = self.line.translated(0.0, -self.leading);
        self.text = self.line;
    }
}

/// Walk decoded operations and collect every text-showing operator.
pub fn shown_text<B: PdfBackend + ?Sized>(
    backend: &B,
    page: PageId,
    ops: &[ContentOp],
    fonts: &[BackendFontInfo],
) -> Vec<ShownText> {
    let fonts: HashMap<&[u8], &BackendFontInfo> =
        fonts.iter().map(|f| (f.name.as_slice(), f)).collect();
    let mut state = TextState {
        leading: 0.0,
        font_size: 12.0,
        ..TextState::default()
    };
    let mut ctm = Matrix::default();
    let mut saved: Vec<Matrix> = Vec::new();
    let mut shown = Vec::new();

    for (op_index, op) in ops.iter().enumerate() {
        let num = |i: usize, default: f32| {
            op.operands
                .get(i)
                .and_then(get_number_from_value)
                .unwrap_or(default)
        };
        let matrix = || Matrix {
            a: num(0, 1.0),
            b: num(1, 0.0),
            c: num(2, 0.0),
            d: num(3, 1.0),
            e: num(4, 0.0),
            f: num(5, 0.0),
        };
        match op.operator.as_str() {
            "q" => saved.push(ctm),
            // unbalanced Q leaves the transform alone
            "Q" => ctm = saved.pop().unwrap_or(ctm),
            "cm" => ctm = matrix().then(&ctm),
            "BT" => {
                state.text = Matrix::default();
                state.line = Matrix::default();
            }
            "Tf" => {
                if let Some(PdfValue::Name(name)) = op.operands.first() {
                    state.font_key = name.clone();
                }
                state.font_size = num(1, 12.0);
            }
            "TL" => state.leading = num(0, 0.0),
            "Td" => {
                state.line = state.line.translated(num(0, 0.0), num(1, 0.0));
                state.text = state.line;
            }
            "TD" => {
                let ty = num(1, 0.0);
                state.leading = -ty;
                state.line = state.line.translated(num(0, 0.0), ty);
                state.text = state.line;
            }
            "Tm" => {
                state.line = matrix();
                state.text = state.line;
            }
            "T*" => state.next_line(),
            "Tj" | "TJ" | "'" | "\"" => {
                if op.operator == "'" || op.operator == "\"" {
                    state.next_line();
                }
                let Some(font) = fonts.get(state.font_key.as_slice()).copied() else {
                    log::debug!(
                        "Text shown with unknown font /{}",
                        String::from_utf8_lossy(&state.font_key)
                    );
                    continue;
                };
                let operand = match op.operator.as_str() {
                    "\"" => op.operands.get(2),
                    _ => op.operands.first(),
                };
                let Some(operand) = operand else { continue };
                let (text, advance) = decode_operand(backend, page, font, operand);
                let tx = advance * state.font_size;
                let start = state.text.then(&ctm);
                state.text = state.text.translated(tx, 0.0);

                if !text.trim().is_empty() {
                    shown.push(ShownText {
                        op_index,
                        text,
                        x: start.e,
                        y: start.f,
                        width: tx * start.x_scale(),
                        font_size: state.font_size * start.y_scale(),
                        font_name: font.base_font.clone(),
                        rotated: start.is_rotated(),
                    });
                }
            }
            _ => {}
        }
    }

    shown
}

/// Decode a `Tj` string or a `TJ` array, returning text and advance in ems.
fn decode_operand<B: PdfBackend + ?Sized>(
    backend: &B,
    page: PageId,
    font: &BackendFontInfo,
    operand: &PdfValue,
) -> (String, f32) {
    match operand {
        PdfValue::Str(bytes) => (backend.decode_text(page, font, bytes), font.advance(bytes)),
        PdfValue::Array(items) => {
            let mut combined = String::new();
            let mut advance = 0.0;
            for item in items {
                match item {
                    PdfValue::Str(bytes) => {
                        combined.push_str(&backend.decode_text(page, font, bytes));
                        advance += font.advance(bytes);
                    }
                    PdfValue::Integer(_) | PdfValue::Real(_) => {
                        let adjustment = get_number_from_value(item).unwrap_or(0.0);
                        advance -= adjustment / 1000.0;
                        // Large negative adjustments separate words.
                        if -adjustment > TJ_SPACE_THRESHOLD
                            && !combined.is_empty()
                            && !combined.ends_with(' ')
                            && !combined.ends_with('\u{00A0}')
                        {
                            combined.push(' ');
                        }
                    }
                    _ => {}
                }
            }
            (combined, advance)
        }
        _ => (String::new(), 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::error::Result;
    use crate::model::PageSize;
    use crate::parser::backend::decode_text_simple;

    struct NoBackend;

    impl PdfBackend for NoBackend {
        fn pages(&self) -> BTreeMap<u32, PageId> {
            BTreeMap::new()
        }
        fn page_size(&self, _page: PageId) -> PageSize {
            PageSize::default()
        }
        fn page_fonts(&self, _page: PageId) -> Result<Vec<BackendFontInfo>> {
            Ok(Vec::new())
        }
        fn page_content(&self, _page: PageId) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn decode_content(&self, _data: &[u8]) -> Result<Vec<ContentOp>> {
            Ok(Vec::new())
        }
        fn decode_text(&self, _page: PageId, _font: &BackendFontInfo, bytes: &[u8]) -> String {
            decode_text_simple(bytes)
        }
    }

    fn op(operator: &str, operands: Vec<PdfValue>) -> ContentOp {
        ContentOp {
            operator: operator.to_string(),
            operands,
        }
    }

    fn helvetica() -> BackendFontInfo {
        BackendFontInfo {
            name: b"F1".to_vec(),
            base_font: "Helvetica-Bold".to_string(),
            first_char: 0,
            widths: Vec::new(),
            composite: false,
            has_to_unicode: false,
        }
    }

    #[test]
    fn test_positions_follow_td_and_leading() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(10)]),
            op("TL", vec![PdfValue::Integer(14)]),
            op("Td", vec![PdfValue::Integer(72), PdfValue::Integer(700)]),
            op("Tj", vec![PdfValue::Str(b"Hello".to_vec())]),
            op("T*", vec![]),
            op("Tj", vec![PdfValue::Str(b"World".to_vec())]),
            op("ET", vec![]),
        ];
        let shown = shown_text(&NoBackend, (1, 0), &ops, &[helvetica()]);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].op_index, 4);
        assert_eq!((shown[0].x, shown[0].y), (72.0, 700.0));
        // 5 glyphs at the 500/1000 fallback width, 10pt
        assert!((shown[0].width - 25.0).abs() < 1e-4);
        assert_eq!((shown[1].x, shown[1].y), (72.0, 686.0));
        assert_eq!(shown[1].font_name, "Helvetica-Bold");
    }

    #[test]
    fn test_tj_array_inserts_word_spaces() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(12)]),
            op(
                "TJ",
                vec![PdfValue::Array(vec![
                    PdfValue::Str(b"Annual".to_vec()),
                    PdfValue::Integer(-300),
                    PdfValue::Str(b"report".to_vec()),
                    PdfValue::Integer(-20),
                    PdfValue::Str(b"s".to_vec()),
                ])],
            ),
        ];
        let shown = shown_text(&NoBackend, (1, 0), &ops, &[helvetica()]);
        assert_eq!(shown[0].text, "Annual reports");
    }

    #[test]
    fn test_rotated_matrix_is_flagged() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(12)]),
            op(
                "Tm",
                vec![
                    PdfValue::Integer(0),
                    PdfValue::Integer(1),
                    PdfValue::Integer(-1),
                    PdfValue::Integer(0),
                    PdfValue::Integer(50),
                    PdfValue::Integer(100),
                ],
            ),
            op("Tj", vec![PdfValue::Str(b"Sideways".to_vec())]),
        ];
        let shown = shown_text(&NoBackend, (1, 0), &ops, &[helvetica()]);
        assert!(shown[0].rotated);
    }

    fn nums(values: &[f32]) -> Vec<PdfValue> {
        values.iter().map(|v| PdfValue::Real(*v)).collect()
    }

    #[test]
    fn test_positions_follow_page_transform() {
        let ops = vec![
            op("q", vec![]),
            op("cm", nums(&[1.0, 0.0, 0.0, 1.0, 200.0, 0.0])),
            op("q", vec![]),
            op("cm", nums(&[2.0, 0.0, 0.0, 2.0, 0.0, 0.0])),
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(10)]),
            op("Td", vec![PdfValue::Integer(10), PdfValue::Integer(100)]),
            op("Tj", vec![PdfValue::Str(b"Scaled".to_vec())]),
            op("ET", vec![]),
            op("Q", vec![]),
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(10)]),
            op("Td", vec![PdfValue::Integer(72), PdfValue::Integer(700)]),
            op("Tj", vec![PdfValue::Str(b"Shifted".to_vec())]),
            op("ET", vec![]),
            op("Q", vec![]),
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(10)]),
            op("Td", vec![PdfValue::Integer(72), PdfValue::Integer(600)]),
            op("Tj", vec![PdfValue::Str(b"Plain".to_vec())]),
        ];
        let shown = shown_text(&NoBackend, (1, 0), &ops, &[helvetica()]);
        assert_eq!(shown.len(), 3);
        // scale 2 then shift 200
        assert_eq!((shown[0].x, shown[0].y), (220.0, 200.0));
        assert_eq!(shown[0].font_size, 20.0);
        assert!((shown[0].width - 60.0).abs() < 1e-4);
        assert_eq!((shown[1].x, shown[1].y), (272.0, 700.0));
        assert_eq!(shown[1].font_size, 10.0);
        assert_eq!((shown[2].x, shown[2].y), (72.0, 600.0));
    }

    #[test]
    fn test_flipped_page_transform_is_upright() {
        let ops = vec![
            op("cm", nums(&[0.75, 0.0, 0.0, -0.75, 0.0, 792.0])),
            op("BT", vec![]),
            op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(16)]),
            op("Tm", nums(&[1.0, 0.0, 0.0, -1.0, 96.0, 120.0])),
            op("Tj", vec![PdfValue::Str(b"Heading".to_vec())]),
        ];
        let shown = shown_text(&NoBackend, (1, 0), &ops, &[helvetica()]);
        assert_eq!((shown[0].x, shown[0].y), (72.0, 702.0));
        assert_eq!(shown[0].font_size, 12.0);
        assert!(!shown[0].rotated);
    }
}
