//! Connectivity monitoring
//!
//! [`ConnectivityMonitor`] keeps a single online/offline flag fed by a
//! [`SignalSource`] and tells its listeners about every real transition.
//! Repeated signals that do not change the state are swallowed.
//!
//! Listeners are de-duplicated by identity: registering the same
//! [`Listener`] `Arc` twice has no effect, so each listener fires once per
//! transition.
//!
//! ```rust
//! use std::sync::Arc;
//! use tether_resilience::{ConnectivityMonitor, ManualSignals, Signal};
//!
//! let signals = Arc::new(ManualSignals::new(true));
//! let monitor = ConnectivityMonitor::new(signals.clone());
//! monitor.init();
//!
//! signals.emit(Signal::Unreachable);
//! assert!(!monitor.online());
//! ```

mod listeners;
mod signals;

use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

pub use listeners::{Listener, ListenerId};
pub use signals::{ManualSignals, Registration, Signal, SignalHandler, SignalSource};

use listeners::ListenerSet;

struct MonitorState {
    online: bool,
    registrations: Option<[Registration; 2]>,
    listeners: ListenerSet,
}

struct MonitorInner {
    source: Arc<dyn SignalSource>,
    state: Mutex<MonitorState>,
}

impl MonitorInner {
    fn apply(&self, signal: Signal) {
        let online = signal.is_online();
        let listeners = {
            let mut state = self.state.lock();
            if state.online == online {
                debug!(?signal, "ignoring repeated reachability signal");
                return;
            }
            state.online = online;
            state.listeners.snapshot()
        };

        info!(online, listeners = listeners.len(), "connectivity changed");
        for listener in listeners {
            listener(online);
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        if let Some(registrations) = self.state.get_mut().registrations.take() {
            for registration in registrations {
                self.source.unregister(registration);
            }
        }
    }
}

/// Tracks whether the network is reachable.
///
/// Clones share state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectivityMonitor")
            .field("online", &state.online)
            .field("initialized", &state.registrations.is_some())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl ConnectivityMonitor {
    /// Monitor seeded with the source's current reachability. Signals are not
    /// observed until [`init`](Self::init).
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        let online = source.is_reachable();
        Self {
            inner: Arc::new(MonitorInner {
                source,
                state: Mutex::new(MonitorState {
                    online,
                    registrations: None,
                    listeners: ListenerSet::default(),
                }),
            }),
        }
    }

    /// Start observing the source. Calling it again is a no-op.
    ///
    /// The online flag is resynced from the source, so a change missed while
    /// torn down is delivered to listeners here.
    pub fn init(&self) {
        let reachable = {
            let mut state = self.inner.state.lock();
            if state.registrations.is_some() {
                return;
            }

            let register = |signal: Signal| {
                let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
                self.inner.source.register(
                    signal,
                    Arc::new(move |signal: Signal| {
                        if let Some(inner) = weak.upgrade() {
                            inner.apply(signal);
                        }
                    }),
                )
            };
            state.registrations =
                Some([register(Signal::Reachable), register(Signal::Unreachable)]);
            debug!(online = state.online, "connectivity monitor initialized");
            self.inner.source.is_reachable()
        };

        self.inner.apply(if reachable {
            Signal::Reachable
        } else {
            Signal::Unreachable
        });
    }

    /// Stop observing the source. Listeners stay registered; a later
    /// [`init`](Self::init) resumes delivery.
    pub fn teardown(&self) {
        let registrations = self.inner.state.lock().registrations.take();
        if let Some(registrations) = registrations {
            for registration in registrations {
                self.inner.source.unregister(registration);
            }
            debug!("connectivity monitor torn down");
        }
    }

    /// Whether signals are being observed.
    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().registrations.is_some()
    }

    /// Current state.
    pub fn online(&self) -> bool {
        self.inner.state.lock().online
    }

    /// Subscribe to transitions. Adding the same `Arc` again returns the
    /// existing id.
    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.inner.state.lock().listeners.add(listener)
    }

    /// Subscribe a closure.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(callback))
    }

    /// Unsubscribe by id. Returns whether anything was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.state.lock().listeners.remove(id)
    }

    /// Unsubscribe by identity. Returns whether anything was removed.
    pub fn remove_callback(&self, listener: &Listener) -> bool {
        self.inner.state.lock().listeners.remove_listener(listener)
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }
}

static PLATFORM_SIGNALS: LazyLock<Arc<ManualSignals>> =
    LazyLock::new(|| Arc::new(ManualSignals::new(true)));

static GLOBAL_MONITOR: LazyLock<ConnectivityMonitor> = LazyLock::new(|| {
    let source: Arc<dyn SignalSource> = platform_signals();
    ConnectivityMonitor::new(source)
});

/// Process-wide signal source the host feeds reachability events into.
pub fn platform_signals() -> Arc<ManualSignals> {
    Arc::clone(&PLATFORM_SIGNALS)
}

/// Process-wide monitor observing [`platform_signals`].
///
/// Call [`ConnectivityMonitor::init`] once at startup.
pub fn global() -> &'static ConnectivityMonitor {
    &GLOBAL_MONITOR
}
