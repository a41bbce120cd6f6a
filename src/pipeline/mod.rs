//! Document processing pipeline.
//!
//! A job runs as a chain of independently schedulable tasks:
//!
//! ```text
//! StartProcessing -> ExtractFeatures -> RenderPageImages
//!                                    -> AttachRenderedImages (polls, reschedules itself)
//! UpdateTitle (manual re-entry)
//! ```
//!
//! [`Pipeline::execute`] runs one task and returns the follow-ups with their
//! delays; [`WorkerPool`] drives that loop on background threads. Progress is
//! published to a [`ProgressStore`] and derived fields to a [`DocumentStore`].

mod config;
mod progress;
mod queue;
mod render;
mod store;

pub use config::PipelineConfig;
pub use progress::{JobProgress, MemoryProgressStore, ProgressKey, ProgressStore, ProgressValue};
pub use queue::{TaskExecutor, WorkerPool};
pub use render::{page_number, page_readiness, rendered_pages, PageReadiness, PageRenderer, PdftoppmRenderer};
pub use store::{DocumentStore, MemoryDocumentStore};

use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::annotate::annotate_file;
use crate::classifier::{TitleCandidate, TitleClassifier};
use crate::error::{Error, Result};
use crate::features::FeatureTable;
use crate::matcher::FuzzyMatcher;
use crate::model::{DocumentRecord, JobState, MatchResult, PageImage};
use crate::parser::{LayoutExtractor, LopdfBackend};

/// One unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    StartProcessing { id: String },
    ExtractFeatures { id: String },
    RenderPageImages { id: String },
    /// `attempt` counts consecutive polls that attached no page. `settled`
    /// marks a run scheduled after the settle delay, which may consume the
    /// final page.
    AttachRenderedImages {
        id: String,
        attempt: u32,
        #[serde(default)]
        settled: bool,
    },
    UpdateTitle { id: String, title: String },
}

impl Task {
    /// Document the task operates on.
    pub fn id(&self) -> &str {
        match self {
            Task::StartProcessing { id }
            | Task::ExtractFeatures { id }
            | Task::RenderPageImages { id }
            | Task::AttachRenderedImages { id, .. }
            | Task::UpdateTitle { id, .. } => id,
        }
    }
}

/// A task with the delay before it may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub task: Task,
    pub delay: Duration,
}

impl Scheduled {
    pub fn now(task: Task) -> Self {
        Self {
            task,
            delay: Duration::ZERO,
        }
    }

    pub fn after(task: Task, delay: Duration) -> Self {
        Self { task, delay }
    }
}

/// Per-job mutual exclusion for the image attachment loop.
#[derive(Debug, Default)]
pub struct JobLocks {
    held: Mutex<HashSet<String>>,
}

impl JobLocks {
    /// Take the lock for `id`, or `None` if another task holds it.
    pub fn try_acquire(&self, id: &str) -> Option<JobLockGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.insert(id.to_string()).then(|| JobLockGuard {
            locks: self,
            id: id.to_string(),
        })
    }
}

/// Releases a job lock when dropped.
pub struct JobLockGuard<'a> {
    locks: &'a JobLocks,
    id: String,
}

impl Drop for JobLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.id);
    }
}

/// Orchestrates document jobs over injected stores and renderer.
pub struct Pipeline {
    config: PipelineConfig,
    progress: Arc<dyn ProgressStore>,
    documents: Arc<dyn DocumentStore>,
    renderer: Arc<dyn PageRenderer>,
    locks: JobLocks,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        progress: Arc<dyn ProgressStore>,
        documents: Arc<dyn DocumentStore>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self {
            config,
            progress,
            documents,
            renderer,
            locks: JobLocks::default(),
        }
    }

    /// Pipeline with in-memory stores and the `pdftoppm` renderer.
    pub fn in_memory(config: PipelineConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryProgressStore::new()),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(PdftoppmRenderer::new()),
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn progress(&self) -> &dyn ProgressStore {
        self.progress.as_ref()
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    /// Status query for a job.
    pub fn status(&self, id: &str) -> Result<JobProgress> {
        JobProgress::fetch(self.progress.as_ref(), id)
    }

    /// Save a record and, if it has never been processed, schedule its job.
    ///
    /// Records that already carry a title or matches, or that have left the
    /// `Created` state, are stored without starting a new job.
    pub fn submit(&self, record: DocumentRecord) -> Result<Option<Scheduled>> {
        let id = record.id.clone();
        let start = record.needs_processing() && record.state == JobState::Created;
        self.documents.insert(record)?;
        if !start {
            log::debug!("{}: already processed, not scheduling", id);
            return Ok(None);
        }

        self.set(&id, ProgressKey::Processed, 0u32);
        self.set(&id, ProgressKey::Total, 1u32);
        log::info!("{}: scheduled for processing", id);
        Ok(Some(Scheduled::after(
            Task::StartProcessing { id },
            self.config.start_delay,
        )))
    }

    /// Run one task and return the tasks it schedules.
    pub fn execute(&self, task: &Task) -> Result<Vec<Scheduled>> {
        log::debug!("Executing {:?}", task);
        match task {
            Task::StartProcessing { id } => self.start_processing(id),
            Task::ExtractFeatures { id } => self.extract_features(id),
            Task::RenderPageImages { id } => self.render_page_images(id),
            Task::AttachRenderedImages { id, attempt, settled } => {
                self.attach_rendered_images(id, *attempt, *settled)
            }
            Task::UpdateTitle { id, title } => self.update_title(id, title),
        }
    }

    fn set(&self, id: &str, key: ProgressKey, value: impl Into<ProgressValue>) {
        self.progress.set(&key.key(id), value.into());
    }

    fn record_error(&self, id: &str, err: &Error) {
        log::warn!("{}: {}", id, err);
        self.set(id, ProgressKey::Error, true);
        self.set(id, ProgressKey::ErrorDescription, err.to_string());
    }

    fn start_processing(&self, id: &str) -> Result<Vec<Scheduled>> {
        let record = self.documents.get(id)?;
        self.documents.set_state(id, JobState::Parsing)?;

        match LopdfBackend::load_file(&record.path) {
            Ok(backend) => {
                self.set(id, ProgressKey::Total, backend.page_count());
                self.set(id, ProgressKey::FeaturesLoaded, false);
                self.set(id, ProgressKey::Processed, 1u32);
                Ok(vec![Scheduled::now(Task::ExtractFeatures { id: id.to_string() })])
            }
            Err(e) => {
                // Unreadable file: report it and let the image stages settle the job.
                self.record_error(id, &e);
                self.set(id, ProgressKey::Processed, 1u32);
                self.finish_extraction(id, JobState::ExtractionFailed)
            }
        }
    }

    fn extract_features(&self, id: &str) -> Result<Vec<Scheduled>> {
        let record = self.documents.get(id)?;
        let outcome = match self.analyze(&record) {
            Ok(candidate) => {
                log::info!("{}: title {:?}", id, candidate.text);
                JobState::MatchesLocated
            }
            Err(e) => {
                self.record_error(id, &e);
                JobState::ExtractionFailed
            }
        };
        self.finish_extraction(id, outcome)
    }

    fn finish_extraction(&self, id: &str, outcome: JobState) -> Result<Vec<Scheduled>> {
        self.documents.set_state(id, outcome)?;
        self.set(id, ProgressKey::FeaturesLoaded, true);
        self.documents.set_state(id, JobState::ImagesRendering)?;
        Ok(vec![
            Scheduled::now(Task::RenderPageImages { id: id.to_string() }),
            Scheduled::now(Task::AttachRenderedImages {
                id: id.to_string(),
                attempt: 0,
                settled: false,
            }),
        ])
    }

    /// Extract, classify, match and annotate. Title and matches are stored
    /// before the file is annotated.
    fn analyze(&self, record: &DocumentRecord) -> Result<TitleCandidate> {
        let id = record.id.as_str();
        let extractor = LayoutExtractor::open(&record.path)?.with_options(self.config.extract.clone());

        let blocks = extractor.extract_first_page()?;
        self.documents.set_state(id, JobState::FeaturesExtracted)?;

        let features = FeatureTable::from_blocks(&blocks);
        let classifier = TitleClassifier::from_checkpoint(&self.config.model_path)?;
        let candidate = classifier.classify(&blocks, &features)?;
        self.documents.set_state(id, JobState::TitleClassified)?;

        let matcher = FuzzyMatcher::new(self.config.matching.clone());
        let matches = matcher.locate_in(&extractor, &candidate.text)?;
        drop(extractor);

        self.documents.update_title(id, &candidate.text, matches.clone())?;
        annotate_file(&record.path, &matches, self.config.highlight_action)?;
        Ok(candidate)
    }

    fn render_page_images(&self, id: &str) -> Result<Vec<Scheduled>> {
        let record = self.documents.get(id)?;
        let dir = self.config.job_dir(id);
        fs::create_dir_all(&dir)?;
        self.renderer.render(&record.path, &dir, id)?;
        log::debug!("{}: pages rendered into {}", id, dir.display());
        Ok(Vec::new())
    }

    fn attach_rendered_images(&self, id: &str, attempt: u32, settled: bool) -> Result<Vec<Scheduled>> {
        let Some(_guard) = self.locks.try_acquire(id) else {
            log::debug!("{}: attachment already running, retrying later", id);
            return Ok(vec![Scheduled::after(
                Task::AttachRenderedImages {
                    id: id.to_string(),
                    attempt,
                    settled,
                },
                self.config.poll_delay,
            )]);
        };

        let record = self.documents.get(id)?;
        if record.state.is_terminal() {
            return Ok(Vec::new());
        }

        let dir = self.config.job_dir(id);
        if !dir.is_dir() {
            return self.reschedule_attach(id, attempt);
        }

        let int = |key: ProgressKey| {
            self.progress
                .get(&key.key(id))
                .and_then(|v| v.as_int())
                .unwrap_or(0)
                .max(0) as u32
        };
        let first = int(ProgressKey::Processed).max(1);
        let total = int(ProgressKey::Total);
        let pages = match rendered_pages(&dir) {
            Ok(pages) => pages,
            Err(e) => {
                log::warn!("{}: cannot list rendered pages: {}", id, e);
                return self.reschedule_attach(id, attempt);
            }
        };

        // Polls that attach a page start the no-progress count over.
        let mut attempt = attempt;
        for page in first..=total {
            self.set(id, ProgressKey::Processed, page);
            let path = match page_readiness(&pages, page, total) {
                PageReadiness::Ready(path) => path,
                PageReadiness::Settling(path) if settled => path,
                PageReadiness::Settling(_) => {
                    return Ok(vec![Scheduled::after(
                        Task::AttachRenderedImages {
                            id: id.to_string(),
                            attempt,
                            settled: true,
                        },
                        self.config.settle_delay,
                    )]);
                }
                PageReadiness::Pending => return self.reschedule_attach(id, attempt),
            };
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("{}: cannot read {}: {}", id, path.display(), e);
                    return self.reschedule_attach(id, attempt);
                }
            };
            self.documents.attach_page_image(
                id,
                PageImage {
                    order: page,
                    name: format!("{}-{}.png", id, page),
                    data,
                },
            )?;
            attempt = 0;
        }

        if let Err(e) = fs::remove_dir_all(&dir) {
            log::warn!("{}: cannot remove {}: {}", id, dir.display(), e);
        }
        self.documents.set_state(id, JobState::ImagesAttached)?;
        self.documents.set_state(id, JobState::Complete)?;
        log::info!("{}: complete, {} page image(s)", id, total);
        Ok(Vec::new())
    }

    fn reschedule_attach(&self, id: &str, attempt: u32) -> Result<Vec<Scheduled>> {
        if let Some(max) = self.config.max_attach_polls {
            if attempt >= max {
                log::error!("{}: no page image attached in {} polls", id, attempt);
                let dir = self.config.job_dir(id);
                if dir.exists() {
                    if let Err(e) = fs::remove_dir_all(&dir) {
                        log::warn!("{}: cannot remove {}: {}", id, dir.display(), e);
                    }
                }
                self.documents.set_state(id, JobState::RenderingFailed)?;
                return Ok(Vec::new());
            }
        }
        Ok(vec![Scheduled::after(
            Task::AttachRenderedImages {
                id: id.to_string(),
                attempt: attempt + 1,
                settled: false,
            },
            self.config.poll_delay,
        )])
    }

    fn update_title(&self, id: &str, title: &str) -> Result<Vec<Scheduled>> {
        let record = self.documents.get(id)?;
        self.set(id, ProgressKey::FeaturesLoaded, false);

        match self.rematch(&record, title) {
            Ok(matches) => {
                log::info!("{}: title set to {:?}, {} matches", id, title, matches.len());
                self.documents.update_title(id, title, matches)?;
            }
            Err(e) => self.record_error(id, &e),
        }

        self.set(id, ProgressKey::FeaturesLoaded, true);
        Ok(Vec::new())
    }

    fn rematch(&self, record: &DocumentRecord, title: &str) -> Result<Vec<MatchResult>> {
        let extractor = LayoutExtractor::open(&record.path)?.with_options(self.config.extract.clone());
        extractor.extract_first_page()?;
        FuzzyMatcher::new(self.config.matching.clone()).locate_in(&extractor, title)
    }
}

impl TaskExecutor for Pipeline {
    fn execute(&self, task: &Task) -> Result<Vec<Scheduled>> {
        Pipeline::execute(self, task)
    }
}
