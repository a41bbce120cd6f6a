//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotate::AnnotationAction;
use crate::matcher::MatchOptions;
use crate::parser::ExtractOptions;

/// Settings shared by all pipeline stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Classifier checkpoint, read on every classification.
    pub model_path: PathBuf,

    /// Root of the job-scoped directories page images are rendered into.
    pub work_dir: PathBuf,

    /// Delay before processing starts after a document is submitted.
    pub start_delay: Duration,

    /// Delay between polls for rendered page images.
    pub poll_delay: Duration,

    /// Wait before reading the final rendered page.
    pub settle_delay: Duration,

    /// Reschedules of the attachment loop before giving up; `None` polls forever.
    pub max_attach_polls: Option<u32>,

    /// Action applied to located matches after classification.
    pub highlight_action: AnnotationAction,

    pub extract: ExtractOptions,

    pub matching: MatchOptions,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set start, poll and settle delays at once.
    pub fn with_delays(mut self, start: Duration, poll: Duration, settle: Duration) -> Self {
        self.start_delay = start;
        self.poll_delay = poll;
        self.settle_delay = settle;
        self
    }

    /// Remove all delays (useful for tests and batch runs).
    pub fn without_delays(self) -> Self {
        self.with_delays(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_max_attach_polls(mut self, polls: Option<u32>) -> Self {
        self.max_attach_polls = polls;
        self
    }

    pub fn with_highlight_action(mut self, action: AnnotationAction) -> Self {
        self.highlight_action = action;
        self
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract = options;
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.matching = options;
        self
    }

    /// Directory page images of a job are rendered into.
    pub fn job_dir(&self, id: &str) -> PathBuf {
        self.work_dir.join(id)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("ml/checkpoints/models.json"),
            work_dir: PathBuf::from("tmp"),
            start_delay: Duration::from_secs(1),
            poll_delay: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            max_attach_polls: Some(600),
            highlight_action: AnnotationAction::Highlight,
            extract: ExtractOptions::default(),
            matching: MatchOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.model_path, PathBuf::from("ml/checkpoints/models.json"));
        assert_eq!(config.poll_delay, Duration::from_secs(1));
        assert_eq!(config.max_attach_polls, Some(600));
        assert_eq!(config.job_dir("abc"), PathBuf::from("tmp/abc"));
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new()
            .with_work_dir("/var/tmp/jobs")
            .with_max_attach_polls(None)
            .with_highlight_action(AnnotationAction::Frame)
            .without_delays();
        assert_eq!(config.job_dir("x"), PathBuf::from("/var/tmp/jobs/x"));
        assert_eq!(config.max_attach_polls, None);
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.highlight_action, AnnotationAction::Frame);
    }
}
