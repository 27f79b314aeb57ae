//! Subscriber registry with identity-based de-duplication

use std::ptr;
use std::sync::Arc;

/// Callback receiving the new online state on every transition.
pub type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl ListenerSet {
    /// Register a listener. A listener already present (same `Arc`) keeps its
    /// original id and position.
    pub(crate) fn add(&mut self, listener: Listener) -> ListenerId {
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| same_listener(existing, &listener))
        {
            return *id;
        }
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn remove_listener(&mut self, listener: &Listener) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(_, existing)| !same_listener(existing, listener));
        self.entries.len() != before
    }

    /// Listeners in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_arc_is_registered_once() {
        let mut set = ListenerSet::default();
        let listener: Listener = Arc::new(|_: bool| {});

        let first = set.add(listener.clone());
        let second = set.add(listener.clone());

        assert_eq!(first, second);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn distinct_closures_are_distinct_listeners() {
        let mut set = ListenerSet::default();
        let a = set.add(Arc::new(|_: bool| {}));
        let b = set.add(Arc::new(|_: bool| {}));

        assert_ne!(a, b);
        assert_eq!(set.len(), 2);
        assert!(set.remove(a));
        assert!(!set.remove(a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_by_listener_identity() {
        let mut set = ListenerSet::default();
        let listener: Listener = Arc::new(|_: bool| {});
        set.add(listener.clone());

        assert!(set.remove_listener(&listener));
        assert_eq!(set.len(), 0);
    }
}
