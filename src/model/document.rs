//! Document records and the processing state machine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::matching::MatchResult;

/// Where a document is in its processing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Created,
    Parsing,
    FeaturesExtracted,
    ExtractionFailed,
    TitleClassified,
    MatchesLocated,
    ImagesRendering,
    ImagesAttached,
    Complete,
    /// Page images never showed up within the poll budget.
    RenderingFailed,
}

impl JobState {
    /// Whether `next` is reachable from `self` in one step.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, Parsing)
                | (Parsing, FeaturesExtracted)
                | (Parsing, ExtractionFailed)
                | (FeaturesExtracted, TitleClassified)
                | (FeaturesExtracted, ExtractionFailed)
                | (TitleClassified, MatchesLocated)
                | (TitleClassified, ExtractionFailed)
                | (MatchesLocated, ImagesRendering)
                | (ExtractionFailed, ImagesRendering)
                | (ImagesRendering, ImagesAttached)
                | (ImagesRendering, RenderingFailed)
                | (ImagesAttached, Complete)
        )
    }

    /// No automatic transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::RenderingFailed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Parsing => "parsing",
            JobState::FeaturesExtracted => "features_extracted",
            JobState::ExtractionFailed => "extraction_failed",
            JobState::TitleClassified => "title_classified",
            JobState::MatchesLocated => "matches_located",
            JobState::ImagesRendering => "images_rendering",
            JobState::ImagesAttached => "images_attached",
            JobState::Complete => "complete",
            JobState::RenderingFailed => "rendering_failed",
        };
        f.write_str(name)
    }
}

/// A rendered page image attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-indexed page number; unique per document.
    pub order: u32,
    /// Stored file name, `{id}-{order}.png`.
    pub name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// An uploaded document and everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub name: Option<String>,
    /// Location of the PDF; annotation rewrites this file in place.
    pub path: PathBuf,
    pub uploaded: DateTime<Utc>,
    pub ideal_title: Option<String>,
    pub text_locations: Vec<MatchResult>,
    pub images: Vec<PageImage>,
    pub state: JobState,
}

impl DocumentRecord {
    /// Create a fresh record for an uploaded file.
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            id: id.into(),
            name,
            path,
            uploaded: Utc::now(),
            ideal_title: None,
            text_locations: Vec::new(),
            images: Vec::new(),
            state: JobState::Created,
        }
    }

    /// Whether saving this record should start processing.
    ///
    /// Records that already carry a title or match results never restart.
    pub fn needs_processing(&self) -> bool {
        self.ideal_title.is_none() && self.text_locations.is_empty()
    }

    /// First page image, used as the list preview.
    pub fn preview(&self) -> Option<&PageImage> {
        self.images.iter().min_by_key(|img| img.order)
    }
}
