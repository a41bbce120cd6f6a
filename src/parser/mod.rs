//! PDF parsing module.

mod backend;
mod content;
mod layout;
mod options;

pub use backend::{
    decode_text_simple, BackendFontInfo, ContentOp, LopdfBackend, PageId, PdfBackend, PdfValue,
};
pub use content::{shown_text, ShownText};
pub use layout::{LayoutBlock, LayoutExtractor, PageLayout, TextLine, TextSpan};
pub use options::ExtractOptions;
