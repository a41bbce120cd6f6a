//! PDF backend abstraction layer.
//!
//! Provides a trait-based interface for the read side of PDF access,
//! isolating the concrete PDF library (lopdf) from layout analysis.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Document as LopdfDocument, Object};

use crate::error::{Error, Result};
use crate::model::PageSize;

/// Page identifier: (object number, generation number).
pub type PageId = (u32, u16);

/// Glyph widths assumed when a font carries no `/Widths` (thousandths of an em).
const FALLBACK_GLYPH_WIDTH: f32 = 500.0;

/// Font information returned by the backend.
#[derive(Debug, Clone)]
pub struct BackendFontInfo {
    /// Font resource name (key in the page's font dictionary).
    pub name: Vec<u8>,
    /// Base font name (e.g., "Helvetica-Bold").
    pub base_font: String,
    /// First character code covered by `widths`.
    pub first_char: u32,
    /// Glyph advance widths in thousandths of an em.
    pub widths: Vec<f32>,
    /// Type0 font with two-byte codes.
    pub composite: bool,
    /// Whether a `/ToUnicode` map is present.
    pub has_to_unicode: bool,
}

impl BackendFontInfo {
    /// Advance width, in text space units per unit font size, of a code string.
    pub fn advance(&self, bytes: &[u8]) -> f32 {
        if self.composite {
            return bytes.len().div_ceil(2) as f32 * FALLBACK_GLYPH_WIDTH / 1000.0;
        }
        bytes
            .iter()
            .map(|&b| {
                (b as u32)
                    .checked_sub(self.first_char)
                    .and_then(|i| self.widths.get(i as usize).copied())
                    .filter(|w| *w > 0.0)
                    .unwrap_or(FALLBACK_GLYPH_WIDTH)
            })
            .sum::<f32>()
            / 1000.0
    }

    /// Build the `(cid:N)` rendering of unmappable composite-font codes.
    pub fn cid_markers(bytes: &[u8]) -> String {
        bytes
            .chunks(2)
            .map(|c| {
                let code = if c.len() == 2 {
                    u16::from_be_bytes([c[0], c[1]])
                } else {
                    c[0] as u16
                };
                format!("(cid:{})", code)
            })
            .collect()
    }
}

/// A value from a PDF content stream operand.
#[derive(Debug, Clone)]
pub enum PdfValue {
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Other,
}

/// A single operation from a PDF content stream.
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

/// Abstract interface for PDF document access.
///
/// Implementations provide page enumeration, geometry, font info, content
/// stream decoding, and text decoding, without exposing concrete library types.
pub trait PdfBackend {
    /// Return all pages as (page_number → PageId).
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Return the page size from its MediaBox.
    fn page_size(&self, page: PageId) -> PageSize;

    /// Return font info for a given page.
    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>>;

    /// Return the raw (decompressed) content stream bytes for a page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>>;

    /// Parse raw content stream bytes into a sequence of operations.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>>;

    /// Decode a text byte sequence using the font's encoding on the given page.
    fn decode_text(&self, page: PageId, font: &BackendFontInfo, bytes: &[u8]) -> String;

    /// Look up a page id by 1-indexed page number.
    fn page_id(&self, page_num: u32) -> Result<PageId> {
        let pages = self.pages();
        pages
            .get(&page_num)
            .copied()
            .ok_or(Error::PageOutOfRange(page_num, pages.len() as u32))
    }
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|c| {
                if c.len() == 2 {
                    Some(u16::from_be_bytes([c[0], c[1]]))
                } else {
                    None
                }
            })
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }

    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        return s;
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// LopdfBackend: concrete implementation backed by lopdf
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] backed by `lopdf::Document`.
pub struct LopdfBackend {
    doc: LopdfDocument,
}

impl LopdfBackend {
    /// Load from a file path.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let doc = LopdfDocument::load(path)?;
        Ok(Self { doc })
    }

    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data)?;
        Ok(Self { doc })
    }

    /// Wrap an already loaded document.
    pub fn from_document(doc: LopdfDocument) -> Self {
        Self { doc }
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &LopdfDocument {
        &self.doc
    }

    /// Mutable access for the annotation engine.
    pub fn raw_doc_mut(&mut self) -> &mut LopdfDocument {
        &mut self.doc
    }

    /// Give the document back.
    pub fn into_document(self) -> LopdfDocument {
        self.doc
    }

    /// Number of pages.
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }
}

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_size(&self, page: PageId) -> PageSize {
        let mut current = self.doc.get_dictionary(page).ok();
        // MediaBox is inheritable through the page tree.
        while let Some(dict) = current {
            if let Ok(media_box) = dict.get(b"MediaBox") {
                let media_box = match media_box {
                    Object::Reference(r) => self.doc.get_object(*r).ok(),
                    other => Some(other),
                };
                if let Some(Ok(array)) = media_box.map(|o| o.as_array()) {
                    if array.len() >= 4 {
                        let nums: Vec<f32> = array.iter().filter_map(object_number).collect();
                        if nums.len() >= 4 {
                            return PageSize {
                                width: (nums[2] - nums[0]).abs(),
                                height: (nums[3] - nums[1]).abs(),
                            };
                        }
                    }
                }
            }
            current = dict
                .get(b"Parent")
                .and_then(|p| p.as_reference())
                .and_then(|r| self.doc.get_dictionary(r))
                .ok();
        }
        PageSize::default()
    }

    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>> {
        let lopdf_fonts = self
            .doc
            .get_page_fonts(page)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        let mut result = Vec::with_capacity(lopdf_fonts.len());
        for (name, font_dict) in &lopdf_fonts {
            let base_font = font_dict
                .get(b"BaseFont")
                .ok()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let composite = font_dict
                .get(b"Subtype")
                .ok()
                .and_then(|o| o.as_name().ok())
                .map(|n| n == b"Type0")
                .unwrap_or(false);
            let first_char = font_dict
                .get(b"FirstChar")
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(0)
                .max(0) as u32;
            let widths = font_dict
                .get(b"Widths")
                .ok()
                .and_then(|o| match o {
                    Object::Reference(r) => self.doc.get_object(*r).ok(),
                    other => Some(other),
                })
                .and_then(|o| o.as_array().ok())
                .map(|arr| arr.iter().map(|w| object_number(w).unwrap_or(0.0)).collect())
                .unwrap_or_default();
            result.push(BackendFontInfo {
                name: name.clone(),
                base_font,
                first_char,
                widths,
                composite,
                has_to_unicode: font_dict.has(b"ToUnicode"),
            });
        }
        Ok(result)
    }

    fn page_content(&self, page_id: PageId) -> Result<Vec<u8>> {
        let page_dict = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        let contents = match page_dict.get(b"Contents") {
            Ok(contents) => contents,
            // A page without content streams is blank.
            Err(_) => return Ok(Vec::new()),
        };

        let refs: Vec<lopdf::ObjectId> = match contents {
            Object::Reference(r) => match self.doc.get_object(*r) {
                Ok(Object::Array(arr)) => arr.iter().filter_map(|o| o.as_reference().ok()).collect(),
                _ => vec![*r],
            },
            Object::Array(arr) => arr.iter().filter_map(|o| o.as_reference().ok()).collect(),
            _ => return Err(Error::PdfParse("Invalid content stream".to_string())),
        };

        let mut content = Vec::new();
        for r in refs {
            if let Ok(Object::Stream(s)) = self.doc.get_object(r) {
                let data = s
                    .decompressed_content()
                    .unwrap_or_else(|_| s.content.clone());
                content.extend_from_slice(&data);
                content.push(b'\n');
            }
        }
        Ok(content)
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>> {
        let content =
            lopdf::content::Content::decode(data).map_err(|e| Error::PdfParse(e.to_string()))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect())
    }

    fn decode_text(&self, page: PageId, font: &BackendFontInfo, bytes: &[u8]) -> String {
        if font.composite && !font.has_to_unicode {
            return BackendFontInfo::cid_markers(bytes);
        }
        if let Ok(lopdf_fonts) = self.doc.get_page_fonts(page) {
            if let Some(font_dict) = lopdf_fonts.get(&font.name) {
                if let Ok(enc) = font_dict.get_font_encoding(&self.doc) {
                    if let Ok(text) = LopdfDocument::decode_text(&enc, bytes) {
                        return text;
                    }
                }
            }
        }
        if font.composite {
            return BackendFontInfo::cid_markers(bytes);
        }
        decode_text_simple(bytes)
    }
}

/// Convert a `lopdf::Object` to [`PdfValue`].
fn convert_object(obj: &Object) -> PdfValue {
    match obj {
        Object::Integer(i) => PdfValue::Integer(*i),
        Object::Real(r) => PdfValue::Real(*r),
        Object::Name(n) => PdfValue::Name(n.clone()),
        Object::String(b, _) => PdfValue::Str(b.clone()),
        Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        _ => PdfValue::Other,
    }
}

fn object_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Helper: extract a number from a [`PdfValue`].
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(r) => Some(*r),
        _ => None,
    }
}
