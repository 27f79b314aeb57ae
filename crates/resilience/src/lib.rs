//! # Tether Resilience
//!
//! Client-side failure handling for applications that talk to remote
//! services: every failure is turned into a structured, user-presentable
//! record, transient failures are retried with exponential backoff, and the
//! user is told what went wrong through a transient notification queue.
//!
//! ## Components
//!
//! - **Classifier**: maps arbitrary failures to a [`ClassifiedError`]
//!   (kind, severity, user-facing message)
//! - **Retry executor**: re-runs failing async operations with capped
//!   exponential backoff, reporting every failure
//! - **Connectivity monitor**: tracks online/offline state and notifies
//!   listeners on transitions
//! - **Notification queue**: ordered, self-expiring user notices
//! - **Offline data**: last-known-good results per key and writes queued
//!   until connectivity returns
//! - **Resilience facade**: wires the above together for application code
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_resilience::prelude::*;
//!
//! # async fn demo() {
//! let resilience = Resilience::builder().build().expect("default config is valid");
//!
//! let outcome = resilience
//!     .safe_execute(|| async { Ok::<_, RawFailure>("payload") }, None)
//!     .await;
//!
//! assert_eq!(outcome.data, Some("payload"));
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod connectivity;
pub mod core;
pub mod notify;
pub mod offline;
pub mod report;
pub mod retry;

mod facade;

#[cfg(feature = "logging")]
pub mod logging;

pub use classify::{
    AmbientContext, BackoffSchedule, Classifier, ClassifierBuilder, ContextProvider, PatternRule,
    Verdict, classify, retry_delay, should_retry,
};
pub use connectivity::{
    ConnectivityMonitor, Listener, ListenerId, ManualSignals, Signal, SignalSource,
};
pub use crate::core::{
    ClassifiedError, ConfigError, ConfigResult, ErrorContext, ErrorKind, FailureShape, RawFailure,
    ResilienceConfig, Severity, SuggestedAction,
};
pub use facade::{Outcome, Resilience, ResilienceBuilder};
pub use notify::{
    ConnectivityNotices, Lifetime, Notification, NotificationId, NotificationKind,
    NotificationQueue, Priority,
};
pub use offline::{
    CacheOptions, OfflineCache, PendingOperation, PendingOperations, SyncHandler, SyncOnReconnect,
};
pub use report::{
    HistorySink, HistoryStats, RecordedReport, RecordingSink, ReportSink, Reporters, TracingSink,
};
pub use retry::{RetryAttempt, RetryExecutor, with_default_retry, with_retry};

/// Commonly used items for application code.
pub mod prelude {
    pub use crate::classify::{Classifier, classify, retry_delay, should_retry};
    pub use crate::connectivity::{ConnectivityMonitor, ManualSignals, Signal};
    pub use crate::core::{
        ClassifiedError, ErrorContext, ErrorKind, RawFailure, ResilienceConfig, Severity,
    };
    pub use crate::facade::{Outcome, Resilience};
    pub use crate::notify::{NotificationKind, NotificationQueue};
    pub use crate::offline::{CacheOptions, PendingOperation};
    pub use crate::report::ReportSink;
    pub use crate::retry::{RetryExecutor, with_retry};
}
