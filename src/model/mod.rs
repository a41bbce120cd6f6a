//! Data model shared by the extraction, matching and pipeline stages.

mod block;
mod document;
mod geometry;
mod matching;

pub use block::{collapse_whitespace, FontStyle, TextBlock};
pub use document::{DocumentRecord, JobState, PageImage};
pub use geometry::{BoundingBox, PageSize, RelativeBox};
pub use matching::{DiffKind, MatchResult};
