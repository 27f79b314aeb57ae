//! Connectivity transitions as user notices

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Lifetime, NotificationId, NotificationKind, NotificationQueue, Priority};
use crate::connectivity::{ConnectivityMonitor, ListenerId};

/// Sticky notice raised while offline.
pub const OFFLINE_MESSAGE: &str = "You're currently offline. Some features may not work properly.";

/// Short notice raised when connectivity returns.
pub const RECONNECTED_MESSAGE: &str = "Connection restored.";

/// Keeps an offline notice in the queue while the monitor reports offline.
///
/// The bridge stays attached until this guard is dropped.
pub struct ConnectivityNotices {
    monitor: ConnectivityMonitor,
    listener: ListenerId,
    standing: Arc<Mutex<Option<NotificationId>>>,
}

impl ConnectivityNotices {
    /// Attach to `monitor`, posting into `queue`. When the monitor is already
    /// offline the offline notice is raised immediately.
    pub fn attach(
        monitor: &ConnectivityMonitor,
        queue: &NotificationQueue,
        reconnected_ttl: Duration,
    ) -> Self {
        let standing = Arc::new(Mutex::new(None));

        let on_change = {
            let queue = queue.clone();
            let standing = Arc::clone(&standing);
            move |online: bool| transition(&queue, &standing, online, reconnected_ttl)
        };
        if !monitor.online() {
            on_change(false);
        }
        let listener = monitor.subscribe(on_change);

        Self {
            monitor: monitor.clone(),
            listener,
            standing,
        }
    }

    /// Id of the offline notice currently shown, if any.
    pub fn offline_notice(&self) -> Option<NotificationId> {
        *self.standing.lock()
    }
}

fn transition(
    queue: &NotificationQueue,
    standing: &Mutex<Option<NotificationId>>,
    online: bool,
    reconnected_ttl: Duration,
) {
    let mut standing = standing.lock();
    if online {
        if let Some(id) = standing.take() {
            queue.dismiss(id);
        }
        queue.push(
            RECONNECTED_MESSAGE,
            NotificationKind::Info,
            Lifetime::Expires(reconnected_ttl),
            Priority::Normal,
        );
        return;
    }

    // The user may have dismissed the previous notice by hand.
    let shown = standing.is_some_and(|id| queue.contains(id));
    if !shown {
        *standing = Some(queue.push(
            OFFLINE_MESSAGE,
            NotificationKind::Error,
            Lifetime::UntilDismissed,
            Priority::Elevated,
        ));
    }
}

impl Drop for ConnectivityNotices {
    fn drop(&mut self) {
        self.monitor.remove_listener(self.listener);
    }
}

impl fmt::Debug for ConnectivityNotices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityNotices")
            .field("listener", &self.listener)
            .field("offline_notice", &self.offline_notice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ManualSignals, Signal};
    use tokio::time::sleep;

    fn setup(initially: bool) -> (Arc<ManualSignals>, ConnectivityMonitor, NotificationQueue) {
        let signals = Arc::new(ManualSignals::new(initially));
        let monitor = ConnectivityMonitor::new(signals.clone());
        monitor.init();
        (signals, monitor, NotificationQueue::default())
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn offline_then_online() {
        let (signals, monitor, queue) = setup(true);
        let bridge = ConnectivityNotices::attach(&monitor, &queue, Duration::from_secs(3));

        signals.emit(Signal::Unreachable);
        let offline = bridge.offline_notice().expect("offline notice raised");
        let shown = queue.snapshot();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].message, OFFLINE_MESSAGE);
        assert_eq!(shown[0].lifetime, Lifetime::UntilDismissed);
        assert_eq!(shown[0].priority, Priority::Elevated);

        signals.emit(Signal::Reachable);
        assert!(!queue.contains(offline));
        assert_eq!(bridge.offline_notice(), None);
        let shown = queue.snapshot();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].message, RECONNECTED_MESSAGE);
        assert_eq!(shown[0].kind, NotificationKind::Info);

        sleep(Duration::from_millis(3001)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn already_offline_at_attach() {
        let (_, monitor, queue) = setup(false);
        let bridge = ConnectivityNotices::attach(&monitor, &queue, Duration::from_secs(3));
        assert!(bridge.offline_notice().is_some());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn manual_dismiss_then_offline_again_raises_new_notice() {
        let (signals, monitor, queue) = setup(true);
        let bridge = ConnectivityNotices::attach(&monitor, &queue, Duration::from_secs(3));

        signals.emit(Signal::Unreachable);
        let first = bridge.offline_notice().expect("raised");
        queue.dismiss(first);
        signals.emit(Signal::Reachable);
        signals.emit(Signal::Unreachable);

        let second = bridge.offline_notice().expect("raised again");
        assert_ne!(first, second);
        assert!(queue.contains(second));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dropping_the_guard_detaches() {
        let (signals, monitor, queue) = setup(true);
        drop(ConnectivityNotices::attach(&monitor, &queue, Duration::from_secs(3)));
        assert_eq!(monitor.listener_count(), 0);

        signals.emit(Signal::Unreachable);
        assert!(queue.is_empty());
    }
}
