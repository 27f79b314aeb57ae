//! Bounded in-memory error history

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use super::ReportSink;
use crate::core::{ClassifiedError, ErrorContext, ErrorKind, Severity};

/// Errors shown in [`HistoryStats::recent`].
const RECENT_LEN: usize = 10;

/// Aggregate view of the history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Errors currently held.
    pub total: usize,
    /// Count per kind. Kinds never seen are absent.
    pub by_kind: BTreeMap<ErrorKind, usize>,
    /// Count per severity. Severities never seen are absent.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Newest errors first.
    pub recent: Vec<ClassifiedError>,
}

/// Keeps the most recent `capacity` reported errors, newest first.
///
/// Nothing is persisted; the history lives as long as the sink.
#[derive(Debug)]
pub struct HistorySink {
    capacity: usize,
    entries: Mutex<VecDeque<ClassifiedError>>,
}

impl HistorySink {
    /// History holding at most `capacity` errors (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of errors kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Held errors, newest first.
    pub fn history(&self) -> Vec<ClassifiedError> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of held errors.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Counts by kind and severity plus the newest few errors.
    pub fn stats(&self) -> HistoryStats {
        let entries = self.entries.lock();
        let mut stats = HistoryStats {
            total: entries.len(),
            recent: entries.iter().take(RECENT_LEN).cloned().collect(),
            ..HistoryStats::default()
        };
        for error in entries.iter() {
            *stats.by_kind.entry(error.kind()).or_default() += 1;
            *stats.by_severity.entry(error.severity()).or_default() += 1;
        }
        stats
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for HistorySink {
    fn default() -> Self {
        Self::new(crate::core::HistoryConfig::default().capacity)
    }
}

impl ReportSink for HistorySink {
    fn report(&self, error: &ClassifiedError, _tags: &ErrorContext) {
        let mut entries = self.entries.lock();
        entries.push_front(error.clone());
        entries.truncate(self.capacity);
    }
}
