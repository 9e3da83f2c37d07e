//! Last-known query results keyed by [`Topic`].
//!
//! A topic is fresh after a successful fetch and stale after a matching
//! real-time event. Topics never fetched count as stale. Stale entries keep
//! their value so a view can render it while the refetch runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::topics::Topic;

#[derive(Debug)]
struct Entry {
    value: Value,
    fresh: bool,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<Topic, Entry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Topic, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_stale(&self, topic: Topic) -> bool {
        self.entries().get(&topic).is_none_or(|e| !e.fresh)
    }

    /// The cached value, only while fresh.
    pub fn fresh(&self, topic: Topic) -> Option<Value> {
        self.entries()
            .get(&topic)
            .filter(|e| e.fresh)
            .map(|e| e.value.clone())
    }

    /// The cached value whether fresh or not.
    pub fn last_known(&self, topic: Topic) -> Option<Value> {
        self.entries().get(&topic).map(|e| e.value.clone())
    }

    pub fn store(&self, topic: Topic, value: Value) {
        self.entries().insert(topic, Entry { value, fresh: true });
    }

    pub fn invalidate(&self, topic: Topic) {
        if let Some(entry) = self.entries().get_mut(&topic) {
            entry.fresh = false;
        }
    }

    /// Drops every entry, values included.
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn invalidate_all<I>(&self, topics: I)
    where
        I: IntoIterator<Item = Topic>,
    {
        let mut entries = self.entries();
        for topic in topics {
            if let Some(entry) = entries.get_mut(&topic) {
                entry.fresh = false;
            }
        }
    }
}
