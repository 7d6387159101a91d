//! Bounded ring of tool invocation records with client attribution

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client identity used when the transport supplies none.
pub const STDIO_CLIENT: &str = "stdio";

/// One recorded tool invocation. Immutable once added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub tool_name: String,
    /// SQL text or protocol command as submitted
    pub command: String,
    pub duration_ms: u64,
    /// HTTP User-Agent, or "stdio"
    pub client: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only FIFO that overwrites the oldest record when full. The
/// critical section is a push plus at most one pop.
pub struct RequestStore {
    capacity: usize,
    next_id: AtomicU64,
    records: Mutex<VecDeque<RequestRecord>>,
}

/// Filter for [`RequestStore::list`].
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub source_id: Option<String>,
    pub tool_name: Option<String>,
    pub only_failures: bool,
    pub limit: Option<usize>,
}

impl RequestStore {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            records: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Record an invocation, assigning it the next id.
    pub fn add(
        &self,
        source_id: &str,
        tool_name: &str,
        command: &str,
        duration_ms: u64,
        client: &str,
        error: Option<String>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = RequestRecord {
            id,
            timestamp: Utc::now(),
            source_id: source_id.to_string(),
            tool_name: tool_name.to_string(),
            command: command.to_string(),
            duration_ms,
            client: client.to_string(),
            success: error.is_none(),
            error,
        };
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        id
    }

    /// Records newest-first, optionally filtered.
    pub fn list(&self, filter: &RequestFilter) -> Vec<RequestRecord> {
        let records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let iter = records.iter().rev().filter(|r| {
            filter
                .source_id
                .as_deref()
                .map(|s| r.source_id == s)
                .unwrap_or(true)
                && filter
                    .tool_name
                    .as_deref()
                    .map(|t| r.tool_name == t)
                    .unwrap_or(true)
                && (!filter.only_failures || !r.success)
        });
        match filter.limit {
            Some(limit) => iter.take(limit).cloned().collect(),
            None => iter.cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first() {
        let store = RequestStore::new(10);
        store.add("a", "execute_sql", "SELECT 1", 3, STDIO_CLIENT, None);
        store.add("a", "execute_sql", "SELECT 2", 4, STDIO_CLIENT, None);
        let records = store.list(&RequestFilter::default());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].command, "SELECT 2");
        assert_eq!(records[1].command, "SELECT 1");
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let store = RequestStore::new(3);
        for i in 0..5 {
            store.add("a", "t", &format!("q{}", i), 0, STDIO_CLIENT, None);
        }
        let records = store.list(&RequestFilter::default());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].command, "q4");
        assert_eq!(records[2].command, "q2");
    }

    #[test]
    fn test_failure_recorded() {
        let store = RequestStore::new(10);
        store.add("a", "t", "DROP TABLE x", 1, "agent/1.0", Some("denied".into()));
        let records = store.list(&RequestFilter {
            only_failures: true,
            ..Default::default()
        });
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].error.as_deref(), Some("denied"));
        assert_eq!(records[0].client, "agent/1.0");
    }

    #[test]
    fn test_filters() {
        let store = RequestStore::new(10);
        store.add("a", "execute_sql", "q", 0, STDIO_CLIENT, None);
        store.add("b", "execute_sql_b", "q", 0, STDIO_CLIENT, None);
        let filter = RequestFilter {
            source_id: Some("b".into()),
            ..Default::default()
        };
        let records = store.list(&filter);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_id, "b");
    }

    #[test]
    fn test_ids_monotonic() {
        let store = RequestStore::new(2);
        let a = store.add("s", "t", "1", 0, STDIO_CLIENT, None);
        let b = store.add("s", "t", "2", 0, STDIO_CLIENT, None);
        assert!(b > a);
    }
}
