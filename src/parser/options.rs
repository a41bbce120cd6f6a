//! Layout extraction options.

/// Options controlling first-page block extraction and its diagnostics.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Blocks must be strictly longer than this many characters.
    pub min_text_len: usize,

    /// Fewer qualifying blocks than this means a scanned title page
    pub min_blocks: usize,

    /// More qualifying blocks than this is not a title page
    pub max_blocks: usize,

    /// Substring emitted for glyphs without a Unicode mapping
    pub encoding_marker: String,

    /// Maximum vertical gap between lines of one block, as a fraction of line height
    pub line_margin: f32,
}

impl ExtractOptions {
    /// Create new extract options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exclusive minimum block length.
    pub fn with_min_text_len(mut self, len: usize) -> Self {
        self.min_text_len = len;
        self
    }

    /// Set the accepted block count range.
    pub fn with_block_limits(mut self, min: usize, max: usize) -> Self {
        self.min_blocks = min;
        self.max_blocks = max;
        self
    }

    /// Set the line margin used when grouping lines into blocks.
    pub fn with_line_margin(mut self, margin: f32) -> Self {
        self.line_margin = margin;
        self
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            min_text_len: 4,
            min_blocks: 3,
            max_blocks: 25,
            encoding_marker: "(cid:".to_string(),
            line_margin: 0.5,
        }
    }
}
