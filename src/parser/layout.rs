//! Layout analysis for PDF pages.
//!
//! Text-showing operators become spans, spans on a shared baseline become
//! lines, and vertically adjacent, horizontally overlapping lines become
//! blocks. Blocks carry geometry, first-character font style and their
//! index among all text containers of the page.

use std::cmp::Ordering;
use std::path::Path;

use crate::error::{Error, Result, ScanKind};
use crate::model::{collapse_whitespace, BoundingBox, FontStyle, PageSize, TextBlock};

use super::backend::{LopdfBackend, PdfBackend};
use super::content::{shown_text, ShownText};
use super::options::ExtractOptions;

/// Spans further apart than this many font sizes start a new line segment.
const SEGMENT_GAP_EMS: f32 = 3.0;

/// A text span with position and style information.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// The text content
    pub text: String,
    /// X position (left edge)
    pub x: f32,
    /// Y position (baseline)
    pub y: f32,
    /// Width of the text
    pub width: f32,
    /// Font size in points
    pub font_size: f32,
    /// Font name (e.g., "Helvetica-Bold")
    pub font_name: String,
    /// Content stream operator that painted this span
    pub op_index: usize,
    /// Painted with a rotated text matrix
    pub rotated: bool,
}

impl TextSpan {
    /// Get the bottom Y coordinate (approximate, based on font size).
    pub fn bottom(&self) -> f32 {
        self.y - self.font_size * 0.2
    }

    /// Get the top Y coordinate (approximate, based on font size).
    pub fn top(&self) -> f32 {
        self.y + self.font_size * 0.8
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.bottom(), self.right(), self.top())
    }
}

impl From<ShownText> for TextSpan {
    fn from(shown: ShownText) -> Self {
        Self {
            text: shown.text,
            x: shown.x,
            y: shown.y,
            width: shown.width,
            font_size: shown.font_size,
            font_name: shown.font_name,
            op_index: shown.op_index,
            rotated: shown.rotated,
        }
    }
}

/// A text line composed of spans on the same baseline.
#[derive(Debug, Clone)]
pub struct TextLine {
    /// The spans in this line, sorted by X position
    pub spans: Vec<TextSpan>,
    /// Y position (baseline)
    pub y: f32,
    /// Dominant font size in this line
    pub font_size: f32,
}

impl TextLine {
    /// Create a new text line from spans.
    pub fn from_spans(mut spans: Vec<TextSpan>) -> Self {
        spans.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));

        // Dominant font size, weighted by text length
        let total_chars: usize = spans.iter().map(|s| s.text.len()).sum();
        let weighted_size: f32 = spans
            .iter()
            .map(|s| s.font_size * s.text.len() as f32)
            .sum();
        let font_size = if total_chars > 0 {
            weighted_size / total_chars as f32
        } else {
            spans.first().map(|s| s.font_size).unwrap_or(0.0)
        };
        let y = spans.first().map(|s| s.y).unwrap_or(0.0);

        Self { spans, y, font_size }
    }

    /// Get the combined text of all spans with appropriate spacing.
    ///
    /// Inserts spaces between spans based on their X coordinate gaps.
    pub fn text(&self) -> String {
        let mut result = String::new();

        for (i, span) in self.spans.iter().enumerate() {
            if i > 0 {
                let prev = &self.spans[i - 1];
                let gap = span.x - prev.right();

                let char_count = span.text.chars().count();
                let avg_char_width = if char_count > 0 && span.width > 0.0 {
                    span.width / char_count as f32
                } else {
                    span.font_size * 0.5
                };

                let prev_ends_with_space = prev.text.ends_with(' ') || prev.text.ends_with('\u{00A0}');
                let curr_starts_with_space =
                    span.text.starts_with(' ') || span.text.starts_with('\u{00A0}');

                if gap > avg_char_width * 0.2 && !prev_ends_with_space && !curr_starts_with_space {
                    result.push(' ');
                }
            }
            result.push_str(&span.text);
        }

        result
    }

    pub fn bbox(&self) -> BoundingBox {
        self.spans
            .iter()
            .map(TextSpan::bbox)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }
}

/// A block of lines as found on the page, before filtering.
#[derive(Debug, Clone)]
pub struct LayoutBlock {
    /// Position among all blocks of the page, top to bottom.
    pub index: u32,
    pub lines: Vec<TextLine>,
}

impl LayoutBlock {
    /// Text with one `\n`-terminated line per text line.
    pub fn raw_text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(&line.text());
            text.push('\n');
        }
        text
    }

    pub fn bbox(&self) -> BoundingBox {
        self.lines
            .iter()
            .map(TextLine::bbox)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }

    fn first_span(&self) -> Option<&TextSpan> {
        self.lines.first().and_then(|l| l.spans.first())
    }

    /// Convert to the public block type.
    pub fn to_text_block(&self, page: PageSize) -> TextBlock {
        let bounding_box = self.bbox();
        let first = self.first_span();
        TextBlock {
            raw_text: self.raw_text(),
            bounding_box,
            relative_box: bounding_box.relative_to(page),
            font_style: first
                .map(|s| FontStyle::from_font_name(&s.font_name))
                .unwrap_or_default(),
            group_id: match first {
                Some(span) if span.rotated => None,
                _ => Some(self.index),
            },
        }
    }

    /// Find every occurrence of `needle` (whitespace-insensitive) and return,
    /// per occurrence, one box per line it covers.
    pub fn locate(&self, needle: &str) -> Vec<Vec<BoundingBox>> {
        let needle: Vec<char> = collapse_whitespace(needle).chars().collect();
        if needle.is_empty() {
            return Vec::new();
        }

        // Collapsed block text plus the char range each line occupies in it.
        let mut haystack: Vec<char> = Vec::new();
        let mut ranges = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let collapsed = collapse_whitespace(&line.text());
            if collapsed.is_empty() {
                continue;
            }
            if !haystack.is_empty() {
                haystack.push(' ');
            }
            let start = haystack.len();
            haystack.extend(collapsed.chars());
            ranges.push((line, start, haystack.len()));
        }

        let mut occurrences = Vec::new();
        if haystack.len() < needle.len() {
            return occurrences;
        }
        let mut i = 0;
        while i + needle.len() <= haystack.len() {
            if haystack[i..i + needle.len()] != needle[..] {
                i += 1;
                continue;
            }
            let end = i + needle.len();
            let mut rects = Vec::new();
            for (line, start, stop) in &ranges {
                let from = i.max(*start);
                let to = end.min(*stop);
                if from >= to {
                    continue;
                }
                let bbox = line.bbox();
                let len = (*stop - *start) as f32;
                let x1 = bbox.x1 + bbox.width() * (from - start) as f32 / len;
                let x2 = bbox.x1 + bbox.width() * (to - start) as f32 / len;
                rects.push(BoundingBox::new(x1, bbox.y1, x2, bbox.y2));
            }
            occurrences.push(rects);
            i = end;
        }
        occurrences
    }
}

/// All blocks of one page.
#[derive(Debug, Clone)]
pub struct PageLayout {
    /// 1-indexed page number
    pub page: u32,
    pub size: PageSize,
    pub blocks: Vec<LayoutBlock>,
}

impl PageLayout {
    /// Public block view of every block on the page.
    pub fn text_blocks(&self) -> Vec<TextBlock> {
        self.blocks
            .iter()
            .map(|b| b.to_text_block(self.size))
            .collect()
    }

    /// Occurrence boxes of `needle` across all blocks, in block order.
    pub fn locate(&self, needle: &str) -> Vec<Vec<BoundingBox>> {
        self.blocks.iter().flat_map(|b| b.locate(needle)).collect()
    }

    /// Every span on the page.
    pub fn spans(&self) -> impl Iterator<Item = &TextSpan> {
        self.blocks
            .iter()
            .flat_map(|b| b.lines.iter())
            .flat_map(|l| l.spans.iter())
    }
}

/// Layout extractor for PDF pages.
pub struct LayoutExtractor<B: PdfBackend = LopdfBackend> {
    backend: B,
    options: ExtractOptions,
}

impl LayoutExtractor<LopdfBackend> {
    /// Open a PDF file with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(LopdfBackend::load_file(path)?))
    }
}

impl<B: PdfBackend> LayoutExtractor<B> {
    /// Create an extractor over a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            options: ExtractOptions::default(),
        }
    }

    /// Replace the extract options.
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.backend.pages().len() as u32
    }

    /// Analyse one page (1-indexed) into blocks.
    pub fn page_layout(&self, page_num: u32) -> Result<PageLayout> {
        let page_id = self.backend.page_id(page_num)?;
        let size = self.backend.page_size(page_id);
        let fonts = self.backend.page_fonts(page_id)?;
        let content = self.backend.page_content(page_id)?;
        let ops = self.backend.decode_content(&content)?;

        let spans: Vec<TextSpan> = shown_text(&self.backend, page_id, &ops, &fonts)
            .into_iter()
            .map(TextSpan::from)
            .collect();
        log::debug!("Page {}: {} text spans", page_num, spans.len());

        let lines = group_spans_into_lines(spans);
        let blocks = group_lines_into_blocks(lines, self.options.line_margin);

        Ok(PageLayout {
            page: page_num,
            size,
            blocks,
        })
    }

    /// All blocks of a page in public form, unfiltered.
    pub fn page_blocks(&self, page_num: u32) -> Result<Vec<TextBlock>> {
        Ok(self.page_layout(page_num)?.text_blocks())
    }

    /// Extract the qualifying blocks of the first page.
    ///
    /// Returns a diagnostic error when the page is undecodable, scanned, or
    /// has more blocks than a title page plausibly carries.
    pub fn extract_first_page(&self) -> Result<Vec<TextBlock>> {
        let layout = self.page_layout(1)?;
        let mut kept = Vec::new();

        for block in layout.text_blocks() {
            let text = block.flat_text();
            if text.contains(&self.options.encoding_marker) {
                log::warn!("Undecodable glyphs in block {:?}", block.group_id);
                return Err(Error::Encoding(text));
            }
            if text.split_whitespace().next().is_some()
                && text.chars().count() > self.options.min_text_len
            {
                kept.push(block);
            }
        }

        match kept.len() {
            0 => Err(Error::ScannedDocument {
                kind: ScanKind::ImageOnly,
            }),
            n if n < self.options.min_blocks => Err(Error::ScannedDocument {
                kind: ScanKind::PrimarilyScanned,
            }),
            n if n > self.options.max_blocks => Err(Error::Overflow { count: n }),
            n => {
                log::debug!("First page: {} qualifying blocks", n);
                Ok(kept)
            }
        }
    }
}

/// Group spans into lines by baseline, splitting lines at wide horizontal gaps.
fn group_spans_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    if spans.is_empty() {
        return vec![];
    }

    // Sort spans by Y (descending, since PDF Y is bottom-up) then X
    spans.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    });

    let mut rows: Vec<Vec<TextSpan>> = Vec::new();
    let mut current_y: Option<f32> = None;
    for span in spans {
        let y_tolerance = span.font_size * 0.3;
        match (current_y, rows.last_mut()) {
            (Some(y), Some(row)) if (span.y - y).abs() <= y_tolerance => row.push(span),
            _ => {
                current_y = Some(span.y);
                rows.push(vec![span]);
            }
        }
    }

    let mut lines = Vec::new();
    for mut row in rows {
        row.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
        let mut segment: Vec<TextSpan> = Vec::new();
        for span in row {
            if let Some(prev) = segment.last() {
                let limit = prev.font_size.max(span.font_size) * SEGMENT_GAP_EMS;
                if span.x - prev.right() > limit {
                    lines.push(TextLine::from_spans(std::mem::take(&mut segment)));
                }
            }
            segment.push(span);
        }
        if !segment.is_empty() {
            lines.push(TextLine::from_spans(segment));
        }
    }
    lines
}

/// Group lines into blocks: a line joins the most recent block whose last
/// line sits directly above it, overlaps it horizontally and has a similar
/// font size.
fn group_lines_into_blocks(lines: Vec<TextLine>, line_margin: f32) -> Vec<LayoutBlock> {
    let mut blocks: Vec<LayoutBlock> = Vec::new();

    for line in lines {
        let bbox = line.bbox();
        let target = blocks.iter_mut().rev().find(|block| {
            let Some(prev) = block.lines.last() else {
                return false;
            };
            let prev_bbox = prev.bbox();
            let gap = prev_bbox.y1 - bbox.y2;
            let max_height = prev_bbox.height().max(bbox.height());
            gap >= -max_height * 0.5
                && gap <= max_height * line_margin
                && prev_bbox.horizontal_overlap(&bbox) > 0.0
                && (prev.font_size - line.font_size).abs() <= 1.0
        });

        match target {
            Some(block) => block.lines.push(line),
            None => {
                let index = blocks.len() as u32;
                blocks.push(LayoutBlock {
                    index,
                    lines: vec![line],
                });
            }
        }
    }

    blocks
}
