//! Bounded command history and its optional persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// One completed exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// The most recent `capacity` entries, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Restore from entries ordered newest first, keeping at most `capacity`
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut history = Self::new(capacity);
        history.entries.extend(entries.into_iter().take(history.capacity));
        history
    }

    /// Insert at the front; returns the evicted oldest entry on overflow
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::collections::vec_deque::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Append-only log of history entries keyed by session
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record an entry, dropping the oldest beyond `capacity`
    async fn append(
        &self,
        session_id: &str,
        entry: &HistoryEntry,
        capacity: usize,
    ) -> Result<(), String>;

    /// Entries for a session, newest first
    async fn load(&self, session_id: &str) -> Result<Vec<HistoryEntry>, String>;

    async fn clear(&self, session_id: &str) -> Result<(), String>;
}

#[async_trait]
impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    async fn append(
        &self,
        session_id: &str,
        entry: &HistoryEntry,
        capacity: usize,
    ) -> Result<(), String> {
        (**self).append(session_id, entry, capacity).await
    }

    async fn load(&self, session_id: &str) -> Result<Vec<HistoryEntry>, String> {
        (**self).load(session_id).await
    }

    async fn clear(&self, session_id: &str) -> Result<(), String> {
        (**self).clear(session_id).await
    }
}

/// Process-local store; contents do not survive restarts
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    logs: Mutex<HashMap<String, History>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn logs(&self) -> std::sync::MutexGuard<'_, HashMap<String, History>> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        session_id: &str,
        entry: &HistoryEntry,
        capacity: usize,
    ) -> Result<(), String> {
        self.logs()
            .entry(session_id.to_string())
            .or_insert_with(|| History::new(capacity))
            .push(entry.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<HistoryEntry>, String> {
        Ok(self
            .logs()
            .get(session_id)
            .map(History::to_vec)
            .unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> Result<(), String> {
        self.logs().remove(session_id);
        Ok(())
    }
}
