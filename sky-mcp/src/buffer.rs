//! Fixed-capacity buffer of the most recent feed posts.
//!
//! Newest entry first. The ingestion task is the only writer; tool calls
//! take snapshots. The lock is held only for the in-memory operation and
//! never across an `.await`.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 100;

/// One ingested post, as returned by the `getMessages` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    /// Author DID
    #[serde(rename = "did")]
    pub actor_id: String,
    pub text: String,
    /// Wall-clock time the post was ingested, in Unix milliseconds
    #[serde(rename = "time")]
    pub observed_at_millis: i64,
}

impl EventEntry {
    /// Create an entry stamped with the current time.
    pub fn new(actor_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_time(actor_id, text, chrono::Utc::now().timestamp_millis())
    }

    pub fn with_time(
        actor_id: impl Into<String>,
        text: impl Into<String>,
        observed_at_millis: i64,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            text: text.into(),
            observed_at_millis,
        }
    }
}

/// Bounded newest-first history.
#[derive(Debug)]
pub struct RecentBuffer {
    capacity: usize,
    entries: RwLock<VecDeque<EventEntry>>,
}

impl RecentBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Insert at the front and evict from the back past capacity.
    pub fn push(&self, entry: EventEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Copy of the current contents, newest first.
    pub fn snapshot(&self) -> Vec<EventEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecentBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
