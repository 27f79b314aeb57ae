//! Offline data support
//!
//! [`OfflineCache`] keeps the last good result per key so reads can fall back
//! to it while the network is down. [`PendingOperations`] queues writes made
//! while offline, and [`SyncOnReconnect`] hands them back once connectivity
//! returns.

mod cache;
mod pending;

pub use cache::{CacheOptions, OfflineCache};
pub use pending::{PendingOperation, PendingOperations, SyncHandler, SyncOnReconnect};
