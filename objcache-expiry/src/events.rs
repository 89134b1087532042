//! The expiry event-callback list (supplemented from `cache_expire.c`'s
//! `exp_callback`): external subscribers — a metrics collector, a test
//! harness — observe heap transitions without polling counters.

use std::sync::Arc;

use objcache_core::ObjCore;
use parking_lot::RwLock;

/// A single transition the expiry engine reports to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryEvent {
    /// The core was inserted into the heap for the first time.
    Inserted,
    /// The core's heap key changed (rearm, or epoch reset).
    Moved,
    /// The core's effective deadline was reached and it was marked dying.
    Expired,
}

type Callback = Box<dyn Fn(&Arc<ObjCore>, ExpiryEvent) + Send + Sync>;

/// An ordered list of subscribers, walked under a read lock on every
/// mailed event. Registration is expected at startup, not on the hot
/// path, so a `Vec` behind an `RwLock` is adequate — no need for the
/// lock-free machinery the hash index needs.
#[derive(Default)]
pub struct EventList {
    callbacks: RwLock<Vec<Callback>>,
}

impl EventList {
    /// An empty subscriber list.
    pub fn new() -> Self {
        EventList::default()
    }

    /// Registers a callback, invoked for every subsequent event.
    pub fn subscribe(&self, callback: impl Fn(&Arc<ObjCore>, ExpiryEvent) + Send + Sync + 'static) {
        self.callbacks.write().push(Box::new(callback));
    }

    /// Notifies every subscriber of `event` on `core`, in registration order.
    pub fn notify(&self, core: &Arc<ObjCore>, event: ExpiryEvent) {
        for callback in self.callbacks.read().iter() {
            callback(core, event);
        }
    }

    /// Number of registered subscribers, for tests.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcache_core::ObjFlags;
    use parking_lot::Mutex;

    fn core(id: u64) -> Arc<ObjCore> {
        let oc = ObjCore::new_busy(id);
        oc.with_flags_mut(|f| f.remove(ObjFlags::BUSY));
        oc
    }

    #[test]
    fn subscribers_are_notified_in_registration_order() {
        let events = EventList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_a = Arc::clone(&seen);
        events.subscribe(move |_, ev| seen_a.lock().push((1, ev)));
        let seen_b = Arc::clone(&seen);
        events.subscribe(move |_, ev| seen_b.lock().push((2, ev)));

        events.notify(&core(1), ExpiryEvent::Expired);

        assert_eq!(
            *seen.lock(),
            vec![(1, ExpiryEvent::Expired), (2, ExpiryEvent::Expired)]
        );
    }

    #[test]
    fn empty_list_notifies_nobody_without_panicking() {
        let events = EventList::new();
        assert!(events.is_empty());
        events.notify(&core(1), ExpiryEvent::Inserted);
    }
}
