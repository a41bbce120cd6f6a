//! Error types for doccheck.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for doccheck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a first page was judged to be scanned rather than digital.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// No qualifying text block at all.
    ImageOnly,
    /// Some text, but fewer blocks than a digital title page carries.
    PrimarilyScanned,
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanKind::ImageOnly => write!(f, "page is image-only"),
            ScanKind::PrimarilyScanned => write!(f, "title page is primarily scanned"),
        }
    }
}

/// Error types that can occur while analysing or mutating a document.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The upload is not a PDF file.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// Text on the first page could not be mapped to Unicode.
    #[error("Invalid file encoding: {0}")]
    Encoding(String),

    /// The first page is (mostly) a scanned image.
    #[error("Scanned document: {kind}")]
    ScannedDocument {
        /// Which scan heuristic fired.
        kind: ScanKind,
    },

    /// The first page has more text blocks than a title page plausibly has.
    #[error("Unexpected page structure: {count} text blocks")]
    Overflow {
        /// Number of qualifying blocks found.
        count: usize,
    },

    /// The classifier checkpoint could not be loaded.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Unexpected failure inside the fuzzy matcher.
    #[error("Matching error: {0}")]
    Matching(String),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// No document record with this id.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Status was requested for a job that was never started.
    #[error("Given task does not exist: {0}")]
    TaskNotFound(String),

    /// A job was asked to move to a state it cannot reach from where it is.
    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Job id.
        id: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The external page renderer failed.
    #[error("Rendering error: {0}")]
    Render(String),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is one of the first-page extraction diagnostics.
    pub fn is_extraction_diagnostic(&self) -> bool {
        matches!(
            self,
            Error::Encoding(_) | Error::ScannedDocument { .. } | Error::Overflow { .. }
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::PdfParse(err.to_string()),
        }
    }
}
