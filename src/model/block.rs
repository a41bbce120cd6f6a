//! Text blocks extracted from a page layout.

use serde::{Deserialize, Serialize};

use super::geometry::{BoundingBox, RelativeBox};

/// Font style of a block, decided by its first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
}

impl FontStyle {
    /// Classify a base font name such as `Helvetica-BoldOblique`.
    ///
    /// Bold wins over italic when a name carries both.
    pub fn from_font_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("bold") || lower.contains("black") || lower.contains("heavy") {
            FontStyle::Bold
        } else if lower.contains("italic") || lower.contains("oblique") {
            FontStyle::Italic
        } else {
            FontStyle::Regular
        }
    }

    /// Numeric code used as a model feature.
    pub fn code(self) -> f64 {
        match self {
            FontStyle::Regular => 0.0,
            FontStyle::Bold => 1.0,
            FontStyle::Italic => 2.0,
        }
    }

    pub fn is_bold(self) -> bool {
        self == FontStyle::Bold
    }
}

/// One text-bearing layout unit on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Text as laid out, one `\n`-terminated line per text line.
    pub raw_text: String,
    /// Box in page units.
    pub bounding_box: BoundingBox,
    /// Box normalized to the page size.
    pub relative_box: RelativeBox,
    /// Style of the first character.
    pub font_style: FontStyle,
    /// Index of the block among all text containers on its page; `None`
    /// for vertically set text.
    pub group_id: Option<u32>,
}

impl TextBlock {
    /// Raw text with line breaks removed.
    pub fn flat_text(&self) -> String {
        self.raw_text.replace('\n', "")
    }

    /// Raw text with line breaks turned into spaces and whitespace runs collapsed.
    pub fn collapsed_text(&self) -> String {
        collapse_whitespace(&self.raw_text)
    }

    /// Title form of the block: line breaks become spaces, ends trimmed.
    pub fn title_text(&self) -> String {
        self.raw_text.replace('\n', " ").trim().to_string()
    }
}

/// Join all whitespace-separated tokens with single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
