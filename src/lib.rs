//! # doccheck
//!
//! Title detection and title recurrence checking for PDF documents.
//!
//! The first page of a document is split into text blocks, every block is
//! described by a handful of layout features, and an ensemble of classifiers
//! picks the block most likely to be the document title. The title is then
//! searched for on every page with a windowed edit-distance matcher, and the
//! hits can be highlighted, framed or redacted in the PDF itself.
//!
//! ## Quick Start
//!
//! ```no_run
//! use doccheck::DocCheck;
//!
//! fn main() -> doccheck::Result<()> {
//!     let analysis = DocCheck::new()
//!         .with_model("ml/checkpoints/models.json")
//!         .analyze("document.pdf")?;
//!
//!     println!("Title: {}", analysis.title.text);
//!     for m in &analysis.matches {
//!         println!("page {}: {:?} ({:.3})", m.page, m.window_text, m.normalized_distance);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! - [`parser`]: layout extraction of text blocks with geometry and style
//! - [`features`]: rank and percentage features per block
//! - [`classifier`]: ensemble title classification
//! - [`matcher`]: fuzzy title search with word-level diff tags
//! - [`annotate`]: highlight, frame, markup and redaction of matches
//! - [`pipeline`]: asynchronous job orchestration with progress tracking

pub mod annotate;
pub mod classifier;
pub mod detect;
pub mod error;
pub mod features;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod pipeline;

// Re-export commonly used types
pub use annotate::{annotate_file, AnnotationAction, Annotator};
pub use classifier::{Checkpoint, TitleCandidate, TitleClassifier};
pub use detect::{is_pdf_bytes, validate_upload, validate_upload_bytes};
pub use error::{Error, Result, ScanKind};
pub use features::{FeatureTable, FeatureVector};
pub use matcher::{FuzzyMatcher, Language, MatchOptions, ThresholdMode};
pub use model::{
    BoundingBox, DiffKind, DocumentRecord, FontStyle, JobState, MatchResult, PageImage, PageSize,
    RelativeBox, TextBlock,
};
pub use parser::{ExtractOptions, LayoutExtractor};
pub use pipeline::{
    JobProgress, Pipeline, PipelineConfig, ProgressStore, Scheduled, Task, WorkerPool,
};

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Extract the qualifying text blocks of a document's first page.
///
/// # Example
///
/// ```no_run
/// let blocks = doccheck::extract_blocks("document.pdf").unwrap();
/// for block in &blocks {
///     println!("{:?} {}", block.font_style, block.title_text());
/// }
/// ```
pub fn extract_blocks<P: AsRef<Path>>(path: P) -> Result<Vec<TextBlock>> {
    LayoutExtractor::open(path)?.extract_first_page()
}

/// Classify the title of a document with the given model checkpoint.
pub fn extract_title<P: AsRef<Path>, M: AsRef<Path>>(path: P, model: M) -> Result<TitleCandidate> {
    let blocks = extract_blocks(path)?;
    let features = FeatureTable::from_blocks(&blocks);
    TitleClassifier::from_checkpoint(model)?.classify(&blocks, &features)
}

/// Find every recurrence of `target` in a document with default options.
///
/// # Example
///
/// ```no_run
/// let matches = doccheck::locate_title("document.pdf", "Annual report 2024").unwrap();
/// println!("{} matches", matches.len());
/// ```
pub fn locate_title<P: AsRef<Path>>(path: P, target: &str) -> Result<Vec<MatchResult>> {
    FuzzyMatcher::default().locate(path, target)
}

/// Everything derived from one document in a single pass.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub blocks: Vec<TextBlock>,
    pub features: FeatureTable,
    pub title: TitleCandidate,
    pub matches: Vec<MatchResult>,
}

/// Builder for analysing documents.
pub struct DocCheck {
    model_path: PathBuf,
    extract_options: ExtractOptions,
    match_options: MatchOptions,
}

impl DocCheck {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self {
            model_path: PipelineConfig::default().model_path,
            extract_options: ExtractOptions::default(),
            match_options: MatchOptions::default(),
        }
    }

    /// Set the classifier checkpoint.
    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = options;
        self
    }

    /// Extract, classify and match.
    pub fn analyze<P: AsRef<Path>>(&self, path: P) -> Result<Analysis> {
        let extractor = LayoutExtractor::open(path)?.with_options(self.extract_options.clone());
        let blocks = extractor.extract_first_page()?;
        let features = FeatureTable::from_blocks(&blocks);
        let title = TitleClassifier::from_checkpoint(&self.model_path)?.classify(&blocks, &features)?;
        let matches = FuzzyMatcher::new(self.match_options.clone()).locate_in(&extractor, &title.text)?;

        Ok(Analysis {
            blocks,
            features,
            title,
            matches,
        })
    }

    /// Match an explicit target without classifying.
    pub fn locate<P: AsRef<Path>>(&self, path: P, target: &str) -> Result<Vec<MatchResult>> {
        let extractor = LayoutExtractor::open(path)?.with_options(self.extract_options.clone());
        FuzzyMatcher::new(self.match_options.clone()).locate_in(&extractor, target)
    }
}

impl Default for DocCheck {
    fn default() -> Self {
        Self::new()
    }
}
