//! Persisted set of content ids that were already evaluated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, instrument};
use vigil_error::VigilResult;
use vigil_storage::JsonStore;

const PROCESSED_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ProcessedDocument {
    #[serde(default)]
    processed_ids: BTreeSet<String>,
}

/// Ids of content the evaluator has accepted.
///
/// The set only grows during monitoring; [`forget`](Self::forget) and
/// [`clear`](Self::clear) are operator actions. Every change is written
/// before the mutating call returns.
#[derive(Debug, Default)]
pub struct ProcessedContentSet {
    ids: BTreeSet<String>,
    store: Option<JsonStore<ProcessedDocument>>,
}

impl ProcessedContentSet {
    /// Create an in-memory set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the set persisted at `path`.
    ///
    /// A missing or unreadable document starts an empty set.
    #[instrument(skip(path))]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(path, PROCESSED_DOCUMENT_VERSION);
        let document: ProcessedDocument = store.load_or_default();
        info!(count = document.processed_ids.len(), "Loaded processed content ids");
        Self {
            ids: document.processed_ids,
            store: Some(store),
        }
    }

    /// True when `id` was already processed.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Mark `id` processed. Returns `false` if it already was.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.persist();
        true
    }

    /// Mark several ids processed with a single write.
    ///
    /// Returns how many were new.
    pub fn extend<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.ids.len();
        self.ids.extend(ids.into_iter().map(Into::into));
        let added = self.ids.len() - before;
        if added > 0 {
            self.persist();
        }
        added
    }

    /// Remove one id so its content can be evaluated again.
    #[instrument(skip(self))]
    pub fn forget(&mut self, id: &str) -> bool {
        let removed = self.ids.remove(id);
        if removed {
            info!("Forgot processed content id");
            self.persist();
        } else {
            debug!("Id was not processed");
        }
        removed
    }

    /// Remove every id. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn clear(&mut self) -> usize {
        let count = self.ids.len();
        self.ids.clear();
        info!(cleared = count, "Cleared processed content ids");
        self.persist();
        count
    }

    /// Number of processed ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when nothing was processed yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Processed ids in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Write the set to its backing document, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn flush(&self) -> VigilResult<()> {
        match &self.store {
            Some(store) => store.save(&ProcessedDocument {
                processed_ids: self.ids.clone(),
            }),
            None => Ok(()),
        }
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "Failed to persist processed content ids");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_novelty() {
        let mut set = ProcessedContentSet::new();
        assert!(set.insert("1"));
        assert!(!set.insert("1"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn extend_counts_new_ids() {
        let mut set = ProcessedContentSet::new();
        set.insert("1");
        assert_eq!(set.extend(["1", "2", "3"]), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn legacy_bare_document_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_tweets.json");
        std::fs::write(&path, r#"{"processed_ids": ["17", "42"]}"#).unwrap();

        let set = ProcessedContentSet::open(&path);
        assert!(set.contains("17"));
        assert!(set.contains("42"));
    }
}
