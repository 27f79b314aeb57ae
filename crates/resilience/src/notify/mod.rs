//! User-facing notifications
//!
//! [`NotificationQueue`] holds the ordered list of notices currently shown to
//! the user. Each notice is removed when its lifetime runs out or when it is
//! dismissed, whichever comes first. Expiry timers run on the ambient tokio
//! runtime.
//!
//! [`ConnectivityNotices`] bridges a [`ConnectivityMonitor`] into the queue:
//! going offline raises a sticky error, coming back replaces it with a short
//! "connection restored" notice.
//!
//! [`ConnectivityMonitor`]: crate::connectivity::ConnectivityMonitor

mod bridge;
mod queue;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub use bridge::{ConnectivityNotices, OFFLINE_MESSAGE, RECONNECTED_MESSAGE};
pub use queue::NotificationQueue;

/// Identifier unique within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(u64);

impl NotificationId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification-{}", self.0)
    }
}

/// Visual treatment of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Something failed.
    Error,
    /// Something may need attention.
    Warning,
    /// Purely informational.
    Info,
}

/// How long a notice stays up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Removed automatically after the duration.
    Expires(Duration),
    /// Stays until dismissed.
    UntilDismissed,
}

impl Lifetime {
    /// The duration, for expiring notices.
    pub const fn ttl(self) -> Option<Duration> {
        match self {
            Self::Expires(ttl) => Some(ttl),
            Self::UntilDismissed => None,
        }
    }
}

impl From<Option<Duration>> for Lifetime {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(Self::UntilDismissed, Self::Expires)
    }
}

/// Rendering priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Regular notice.
    #[default]
    Normal,
    /// Raised for high and critical failures.
    Elevated,
}

/// A notice in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Queue-unique id.
    pub id: NotificationId,
    /// Text shown to the user.
    pub message: String,
    /// Visual treatment.
    pub kind: NotificationKind,
    /// How long it stays up.
    pub lifetime: Lifetime,
    /// Rendering priority.
    pub priority: Priority,
    /// When it was added, on the tokio clock.
    pub created_at: Instant,
}

impl Notification {
    /// When the notice expires, if it does.
    pub fn expires_at(&self) -> Option<Instant> {
        self.lifetime.ttl().map(|ttl| self.created_at + ttl)
    }
}
