//! Platform reachability signals

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Edge-triggered reachability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The network became reachable.
    Reachable,
    /// The network became unreachable.
    Unreachable,
}

impl Signal {
    /// `true` for [`Signal::Reachable`].
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Callback a [`SignalSource`] invokes for one signal.
pub type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

/// Handle returned by [`SignalSource::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(u64);

/// Where reachability signals come from.
///
/// Implementations wrap the host platform's online/offline events.
pub trait SignalSource: Send + Sync {
    /// Current reachability, as the platform sees it.
    fn is_reachable(&self) -> bool;

    /// Invoke `handler` every time `signal` fires.
    fn register(&self, signal: Signal, handler: SignalHandler) -> Registration;

    /// Stop invoking a registered handler. Unknown registrations are ignored.
    fn unregister(&self, registration: Registration);
}

/// Signal source driven by explicit [`emit`](ManualSignals::emit) calls.
///
/// Suitable for embedding in hosts that surface reachability through their
/// own event loop, and for tests.
pub struct ManualSignals {
    reachable: AtomicBool,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(Registration, Signal, SignalHandler)>>,
}

impl ManualSignals {
    /// Source whose platform starts reachable or not.
    pub fn new(initially_reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(initially_reachable),
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Fire a signal at every handler registered for it, in registration order.
    ///
    /// Raw signals are passed through as-is, repeats included.
    pub fn emit(&self, signal: Signal) {
        self.reachable.store(signal.is_online(), Ordering::SeqCst);
        let handlers: Vec<SignalHandler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(_, s, _)| *s == signal)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(signal);
        }
    }

    /// Number of handlers registered for `signal`.
    pub fn handler_count(&self, signal: Signal) -> usize {
        self.handlers
            .lock()
            .iter()
            .filter(|(_, s, _)| *s == signal)
            .count()
    }
}

impl Default for ManualSignals {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for ManualSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualSignals")
            .field("reachable", &self.reachable.load(Ordering::SeqCst))
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}

impl SignalSource for ManualSignals {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn register(&self, signal: Signal, handler: SignalHandler) -> Registration {
        let registration = Registration(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((registration, signal, handler));
        registration
    }

    fn unregister(&self, registration: Registration) {
        self.handlers.lock().retain(|(r, _, _)| *r != registration);
    }
}
