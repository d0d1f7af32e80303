//! Structured query-log events. The router emits one [`LogEntry`] per
//! routed query; persistence belongs to whoever drains the receiver.

use janus_dns_domain::LogEntry;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

const MAX_MEMORY_LOGS: usize = 5000;

/// Cloneable handle the router emits through. Disabled emitters drop
/// entries on the floor.
#[derive(Clone)]
pub struct QueryLogEmitter {
    sender: Option<mpsc::UnboundedSender<LogEntry>>,
}

impl QueryLogEmitter {
    pub fn new_disabled() -> Self {
        Self { sender: None }
    }

    pub fn new_enabled() -> (Self, mpsc::UnboundedReceiver<LogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn emit(&self, entry: LogEntry) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(entry);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

impl Default for QueryLogEmitter {
    fn default() -> Self {
        Self::new_disabled()
    }
}

impl std::fmt::Debug for QueryLogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLogEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Aggregate counters over all recorded entries.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogStats {
    pub start_time: String,
    pub total_queries: u64,
    pub total_cn: u64,
    pub total_overseas: u64,
    pub top_clients: HashMap<String, u64>,
    pub top_domains: HashMap<String, u64>,
}

struct LoggerInner {
    entries: VecDeque<LogEntry>,
    next_id: u64,
    stats: QueryLogStats,
}

/// In-memory collector: assigns monotonic ids, keeps a bounded ring of
/// recent entries and aggregate counters. File restore/rotation lives with
/// the hosting process.
pub struct QueryLogger {
    inner: Mutex<LoggerInner>,
}

impl QueryLogger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LoggerInner {
                entries: VecDeque::with_capacity(MAX_MEMORY_LOGS.min(1024)),
                next_id: 1,
                stats: QueryLogStats {
                    start_time: chrono::Utc::now().to_rfc3339(),
                    total_queries: 0,
                    total_cn: 0,
                    total_overseas: 0,
                    top_clients: HashMap::new(),
                    top_domains: HashMap::new(),
                },
            }),
        }
    }

    /// Assigns the entry's id and folds it into the ring and the counters.
    /// Returns the assigned id.
    pub fn record(&self, mut entry: LogEntry) -> u64 {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        entry.id = inner.next_id;
        inner.next_id += 1;
        if entry.time.is_empty() {
            entry.time = chrono::Utc::now().to_rfc3339();
        }

        inner.stats.total_queries += 1;
        if entry.upstream.contains("CN") {
            inner.stats.total_cn += 1;
        } else if entry.upstream.contains("Overseas") {
            inner.stats.total_overseas += 1;
        }
        let client_key = entry.client_ip.to_string();
        *inner.stats.top_clients.entry(client_key).or_insert(0) += 1;
        *inner
            .stats
            .top_domains
            .entry(entry.domain.clone())
            .or_insert(0) += 1;

        let id = entry.id;
        if inner.entries.len() == MAX_MEMORY_LOGS {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
        id
    }

    /// Drains emitted entries until the channel closes.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<LogEntry>) {
        while let Some(entry) = rx.recv().await {
            self.record(entry);
        }
    }

    /// Most recent entries, newest last.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .entries
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> QueryLogStats {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stats
            .clone()
    }
}

impl Default for QueryLogger {
    fn default() -> Self {
        Self::new()
    }
}
