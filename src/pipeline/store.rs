//! Persistence of document records.
//!
//! Stages never write back a whole record they read earlier; each update
//! touches only the fields it owns, so concurrently running stages cannot
//! clobber each other.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{DocumentRecord, JobState, MatchResult, PageImage};

/// Storage of document records.
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a record.
    fn insert(&self, record: DocumentRecord) -> Result<()>;

    fn get(&self, id: &str) -> Result<DocumentRecord>;

    /// Store the classified or user-supplied title and its matches.
    fn update_title(&self, id: &str, title: &str, matches: Vec<MatchResult>) -> Result<()>;

    /// Move a record to a new state, checking the transition.
    fn set_state(&self, id: &str, state: JobState) -> Result<()>;

    /// Attach a page image; an image with the same order is replaced.
    fn attach_page_image(&self, id: &str, image: PageImage) -> Result<()>;

    /// All records, newest first.
    fn list(&self) -> Result<Vec<DocumentRecord>>;
}

/// In-process document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T>(&self, id: &str, f: impl FnOnce(&mut DocumentRecord) -> Result<T>) -> Result<T> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        f(record)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert(&self, record: DocumentRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<DocumentRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    fn update_title(&self, id: &str, title: &str, matches: Vec<MatchResult>) -> Result<()> {
        self.with_record(id, |record| {
            record.ideal_title = Some(title.to_string());
            record.text_locations = matches;
            Ok(())
        })
    }

    fn set_state(&self, id: &str, state: JobState) -> Result<()> {
        self.with_record(id, |record| {
            if record.state == state {
                return Ok(());
            }
            if !record.state.can_transition_to(state) {
                return Err(Error::InvalidTransition {
                    id: id.to_string(),
                    from: record.state.to_string(),
                    to: state.to_string(),
                });
            }
            log::debug!("{}: {} -> {}", id, record.state, state);
            record.state = state;
            Ok(())
        })
    }

    fn attach_page_image(&self, id: &str, image: PageImage) -> Result<()> {
        self.with_record(id, |record| {
            match record.images.iter_mut().find(|img| img.order == image.order) {
                Some(existing) => *existing = image,
                None => {
                    record.images.push(image);
                    record.images.sort_by_key(|img| img.order);
                }
            }
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<DocumentRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<DocumentRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.uploaded.cmp(&a.uploaded));
        Ok(all)
    }
}
