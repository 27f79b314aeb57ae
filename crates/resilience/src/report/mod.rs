//! Reporting sinks
//!
//! Every failure seen by the retry executor or the facade is handed to a
//! [`ReportSink`] together with a tag map describing where it happened.
//! Reporting is fire-and-forget: sinks have no error channel and must not
//! panic.

mod history;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::core::{ClassifiedError, ErrorContext, Severity};

pub use history::{HistorySink, HistoryStats};

/// Tag keys the library itself writes.
pub mod tags {
    /// Which code path reported the failure (`attempt`, `handled`).
    pub const STAGE: &str = "stage";
    /// 1-based attempt number.
    pub const ATTEMPT: &str = "attempt";
    /// Attempt limit of the current run.
    pub const MAX_ATTEMPTS: &str = "max_attempts";
    /// Whether another attempt follows this failure.
    pub const WILL_RETRY: &str = "will_retry";
}

/// Receives classified failures.
pub trait ReportSink: Send + Sync {
    /// Record one failure. Must return promptly and never panic.
    fn report(&self, error: &ClassifiedError, tags: &ErrorContext);
}

// =============================================================================
// TRACING
// =============================================================================

/// Logs each report as a `tracing` event at a level derived from severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, err: &ClassifiedError, tags: &ErrorContext) {
        let tags = serde_json::to_string(tags).unwrap_or_default();
        let context = serde_json::to_string(err.context()).unwrap_or_default();
        match err.severity() {
            Severity::Critical | Severity::High => error!(
                error_id = %err.id(),
                kind = %err.kind(),
                severity = %err.severity(),
                status = err.status(),
                %tags,
                %context,
                "{}",
                err.raw_message()
            ),
            Severity::Medium => warn!(
                error_id = %err.id(),
                kind = %err.kind(),
                severity = %err.severity(),
                status = err.status(),
                %tags,
                %context,
                "{}",
                err.raw_message()
            ),
            Severity::Low => info!(
                error_id = %err.id(),
                kind = %err.kind(),
                severity = %err.severity(),
                status = err.status(),
                %tags,
                %context,
                "{}",
                err.raw_message()
            ),
        }
    }
}

// =============================================================================
// RECORDING
// =============================================================================

/// One captured report.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReport {
    /// The failure.
    pub error: ClassifiedError,
    /// Tags it was reported with.
    pub tags: ErrorContext,
}

/// Keeps every report in memory, oldest first. Meant for tests and debugging.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<RecordedReport>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn reports(&self) -> Vec<RecordedReport> {
        self.reports.lock().clone()
    }

    /// Number of reports.
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ReportSink for RecordingSink {
    fn report(&self, error: &ClassifiedError, tags: &ErrorContext) {
        self.reports.lock().push(RecordedReport {
            error: error.clone(),
            tags: tags.clone(),
        });
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Forwards every report to each registered sink, in registration order.
#[derive(Clone, Default)]
pub struct Reporters {
    sinks: Arc<Vec<Arc<dyn ReportSink>>>,
}

impl Reporters {
    /// No sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        Arc::make_mut(&mut self.sinks).push(sink);
        self
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for Reporters {
    fn report(&self, error: &ClassifiedError, tags: &ErrorContext) {
        for sink in self.sinks.iter() {
            sink.report(error, tags);
        }
    }
}

impl std::fmt::Debug for Reporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporters")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
