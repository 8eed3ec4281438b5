//! Delivery state of in-flight optimistic mutations, keyed by provisional id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Pending,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryRecord<T> {
    pub status: RetryStatus,
    pub payload: T,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Shared map of retry records. Clones share the same records.
#[derive(Debug)]
pub struct RetryStore<T> {
    records: Arc<RwLock<HashMap<String, RetryRecord<T>>>>,
}

impl<T> Clone for RetryStore<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<T> Default for RetryStore<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Clone> RetryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a first attempt. An existing record for `id` is replaced.
    pub fn set(&self, id: &str, status: RetryStatus, payload: T) {
        self.records.write().insert(
            id.to_string(),
            RetryRecord {
                status,
                payload,
                attempts: 1,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
    }

    /// Moves a record to `status`. Going back to `Pending` counts as a new
    /// attempt. Returns false when no record exists.
    pub fn update(&self, id: &str, status: RetryStatus) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        if status == RetryStatus::Pending && record.status == RetryStatus::Error {
            record.attempts += 1;
            record.last_error = None;
        }
        record.status = status;
        record.updated_at = Utc::now();
        true
    }

    pub fn mark_error(&self, id: &str, error: impl Into<String>) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        record.status = RetryStatus::Error;
        record.last_error = Some(error.into());
        record.updated_at = Utc::now();
        true
    }

    pub fn remove(&self, id: &str) -> Option<RetryRecord<T>> {
        self.records.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<RetryRecord<T>> {
        self.records.read().get(id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<RetryStatus> {
        self.records.read().get(id).map(|record| record.status)
    }

    /// Ids of records currently in `status`.
    pub fn ids_with_status(&self, status: RetryStatus) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .read()
            .iter()
            .filter(|(_, record)| record.status == status)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_independent() {
        let store: RetryStore<&str> = RetryStore::new();
        store.set("p1", RetryStatus::Pending, "one");
        store.set("p2", RetryStatus::Pending, "two");

        assert!(store.mark_error("p1", "timeout"));
        assert_eq!(store.status("p1"), Some(RetryStatus::Error));
        assert_eq!(store.status("p2"), Some(RetryStatus::Pending));
        assert_eq!(store.ids_with_status(RetryStatus::Error), vec!["p1"]);

        store.remove("p2");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("p1").unwrap().payload, "one");
    }

    #[test]
    fn retrying_counts_attempts_and_clears_error() {
        let store: RetryStore<u8> = RetryStore::new();
        store.set("p1", RetryStatus::Pending, 7);
        store.mark_error("p1", "boom");
        assert!(store.update("p1", RetryStatus::Pending));

        let record = store.get("p1").unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_error, None);
        assert_eq!(record.status, RetryStatus::Pending);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let store: RetryStore<u8> = RetryStore::new();
        assert!(!store.update("missing", RetryStatus::Error));
        assert!(!store.mark_error("missing", "x"));
        assert!(store.remove("missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clones_share_records() {
        let store: RetryStore<u8> = RetryStore::new();
        let other = store.clone();
        store.set("p1", RetryStatus::Pending, 1);
        assert_eq!(other.status("p1"), Some(RetryStatus::Pending));
    }
}
