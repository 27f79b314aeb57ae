//! Self-expiring notification queue

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::{Lifetime, Notification, NotificationId, NotificationKind, Priority};
use crate::core::constants::DEFAULT_TTL;

struct Entry {
    notification: Notification,
    timer: Option<AbortHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Dismissed,
    Expired,
}

struct QueueInner {
    next_id: AtomicU64,
    default_ttl: Duration,
    entries: Mutex<Vec<Entry>>,
    live: watch::Sender<Arc<[Notification]>>,
}

impl QueueInner {
    fn remove(&self, id: NotificationId, reason: Removal) -> bool {
        let mut entries = self.entries.lock();
        let Some(position) = entries.iter().position(|e| e.notification.id == id) else {
            return false;
        };
        let entry = entries.remove(position);
        if reason == Removal::Dismissed {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
        self.publish(&entries);
        debug!(%id, ?reason, remaining = entries.len(), "notification removed");
        true
    }

    fn publish(&self, entries: &[Entry]) {
        let live: Vec<Notification> = entries.iter().map(|e| e.notification.clone()).collect();
        self.live.send_replace(Arc::from(live));
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().drain(..) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }
}

/// Ordered list of live notifications.
///
/// Cheap to clone; clones share the same list. Notifications are kept in
/// insertion order.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("default_ttl", &self.inner.default_ttl)
            .field("len", &self.len())
            .finish()
    }
}

impl NotificationQueue {
    /// Queue whose `notify` falls back to `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        let (live, _) = watch::channel(Arc::from(Vec::new()));
        Self {
            inner: Arc::new(QueueInner {
                next_id: AtomicU64::new(1),
                default_ttl,
                entries: Mutex::new(Vec::new()),
                live,
            }),
        }
    }

    /// Lifetime used when `notify` is given none.
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Add a notice that expires after `ttl`, or the default lifetime.
    pub fn notify(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        ttl: Option<Duration>,
    ) -> NotificationId {
        let ttl = ttl.unwrap_or(self.inner.default_ttl);
        self.push(message, kind, Lifetime::Expires(ttl), Priority::Normal)
    }

    /// Add a notice that stays until dismissed.
    pub fn notify_sticky(&self, message: impl Into<String>, kind: NotificationKind) -> NotificationId {
        self.push(message, kind, Lifetime::UntilDismissed, Priority::Normal)
    }

    /// Add a notice with explicit lifetime and priority.
    ///
    /// Expiry needs a tokio runtime. Without one the notice stays until
    /// dismissed.
    pub fn push(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        lifetime: Lifetime,
        priority: Priority,
    ) -> NotificationId {
        let id = NotificationId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let notification = Notification {
            id,
            message: message.into(),
            kind,
            lifetime,
            priority,
            created_at: Instant::now(),
        };

        let mut entries = self.inner.entries.lock();
        let timer = lifetime.ttl().and_then(|ttl| self.schedule_expiry(id, ttl));
        debug!(%id, ?kind, ?lifetime, "notification added");
        entries.push(Entry {
            notification,
            timer,
        });
        self.inner.publish(&entries);
        id
    }

    fn schedule_expiry(&self, id: NotificationId, ttl: Duration) -> Option<AbortHandle> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(%id, "no tokio runtime, notification will not expire");
            return None;
        };
        let queue: Weak<QueueInner> = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            sleep(ttl).await;
            if let Some(queue) = queue.upgrade() {
                queue.remove(id, Removal::Expired);
            }
        });
        Some(task.abort_handle())
    }

    /// Remove a notice now and cancel its timer. Unknown ids are ignored.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.inner.remove(id, Removal::Dismissed)
    }

    /// Remove every notice.
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        for entry in entries.drain(..) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
        self.inner.publish(&entries);
    }

    /// Whether a notice is still live.
    pub fn contains(&self, id: NotificationId) -> bool {
        self.inner
            .entries
            .lock()
            .iter()
            .any(|e| e.notification.id == id)
    }

    /// Live notices in insertion order.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    /// Receiver that observes every change to the live list.
    pub fn subscribe(&self) -> watch::Receiver<Arc<[Notification]>> {
        self.inner.live.subscribe()
    }

    /// Number of live notices.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether nothing is shown.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn messages(queue: &NotificationQueue) -> Vec<String> {
        queue.snapshot().into_iter().map(|n| n.message).collect()
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn keeps_insertion_order() {
        let queue = NotificationQueue::default();
        queue.notify("first", NotificationKind::Info, None);
        queue.notify("second", NotificationKind::Warning, None);
        queue.notify_sticky("third", NotificationKind::Error);

        assert_eq!(messages(&queue), vec!["first", "second", "third"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn expires_after_default_ttl() {
        let queue = NotificationQueue::default();
        queue.notify("bye", NotificationKind::Info, None);

        sleep(Duration::from_millis(4999)).await;
        assert_eq!(queue.len(), 1);

        sleep(Duration::from_millis(2)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn explicit_ttl_wins() {
        let queue = NotificationQueue::default();
        let short = queue.notify("short", NotificationKind::Info, Some(Duration::from_secs(1)));
        queue.notify("long", NotificationKind::Info, Some(Duration::from_secs(10)));

        sleep(Duration::from_millis(1001)).await;
        assert!(!queue.contains(short));
        assert_eq!(messages(&queue), vec!["long"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn sticky_notices_outlive_timers() {
        let queue = NotificationQueue::default();
        let id = queue.notify_sticky("offline", NotificationKind::Error);

        sleep(Duration::from_secs(3600)).await;
        assert!(queue.contains(id));
        assert_eq!(queue.snapshot()[0].expires_at(), None);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dismiss_is_idempotent() {
        let queue = NotificationQueue::default();
        let keep = queue.notify("keep", NotificationKind::Info, None);
        let drop_me = queue.notify("drop", NotificationKind::Info, None);

        assert!(queue.dismiss(drop_me));
        let after_first = queue.snapshot();
        assert!(!queue.dismiss(drop_me));
        assert_eq!(queue.snapshot(), after_first);
        assert!(queue.contains(keep));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn subscribers_see_updates() {
        let queue = NotificationQueue::default();
        let mut live = queue.subscribe();

        let id = queue.notify("hello", NotificationKind::Info, None);
        live.changed().await.expect("sender alive");
        assert_eq!(live.borrow_and_update().len(), 1);

        queue.dismiss(id);
        live.changed().await.expect("sender alive");
        assert!(live.borrow_and_update().is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn clear_removes_everything() {
        let queue = NotificationQueue::default();
        queue.notify("a", NotificationKind::Info, None);
        queue.notify_sticky("b", NotificationKind::Error);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn works_without_runtime() {
        let queue = NotificationQueue::default();
        let id = queue.notify("no runtime", NotificationKind::Warning, None);
        assert!(queue.contains(id));
        assert!(queue.dismiss(id));
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let queue = NotificationQueue::default();
        let a = queue.notify_sticky("a", NotificationKind::Info);
        let b = queue.notify_sticky("b", NotificationKind::Info);
        assert!(b > a);
    }
}
