//! The mailbox external threads post to instead of touching the expiry
//! heap directly (spec §4.4: "a locked FIFO ... the background thread
//! drains it"). Mail deliberately carries no deadline payload: whichever
//! deadline was current when the mail was posted may already be stale by
//! the time the background thread drains it, so the drain loop always
//! re-reads the live `ObjCore::exp()` instead of trusting what's on the
//! envelope.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use objcache_backend::Store;
use objcache_core::ObjCore;
use parking_lot::{Condvar, Mutex};

/// What changed about a core's relationship to the expiry heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailOp {
    /// The core is newly cacheable and should be inserted into the heap.
    Insert,
    /// The core's deadline changed (a `rearm`) and its heap position
    /// should be reconsidered.
    Move,
    /// The core is dying and should be pulled out of the heap entirely.
    Dying,
}

/// A single posted mail item.
pub struct Mail {
    /// The affected core.
    pub core: Arc<ObjCore>,
    /// The store (LRU + gauges) that core belongs to.
    pub store: Arc<Store>,
    /// What changed.
    pub op: MailOp,
}

/// The locked FIFO plus the condvar the background thread sleeps on,
/// woken either by new mail or by its own heap-root deadline.
#[derive(Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Mail>>,
    condvar: Condvar,
}

impl Mailbox {
    /// An empty mailbox.
    pub fn new() -> Self {
        Mailbox::default()
    }

    /// Posts `mail`, waking the background thread if it's sleeping.
    pub fn post(&self, core: Arc<ObjCore>, store: Arc<Store>, op: MailOp) {
        self.queue.lock().push_back(Mail { core, store, op });
        self.condvar.notify_one();
    }

    /// Drains every currently-queued item without blocking.
    pub fn drain(&self) -> Vec<Mail> {
        let mut queue = self.queue.lock();
        queue.drain(..).collect()
    }

    /// Whether any mail is currently queued, without draining it.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Blocks the calling (background) thread until either new mail
    /// arrives or `timeout` elapses, whichever is first. Returns `true`
    /// if woken by mail (the caller should re-check `drain`), `false` on
    /// a plain timeout (the caller should re-check the heap root).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut queue = self.queue.lock();
        if !queue.is_empty() {
            return true;
        }
        let result = self.condvar.wait_for(&mut queue, timeout);
        !result.timed_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcache_core::ObjFlags;
    use std::sync::Barrier;
    use std::thread;

    fn core(id: u64) -> Arc<ObjCore> {
        let oc = ObjCore::new_busy(id);
        oc.with_flags_mut(|f| f.remove(ObjFlags::BUSY));
        oc
    }

    #[test]
    fn post_then_drain_returns_all_queued_mail() {
        let mailbox = Mailbox::new();
        mailbox.post(core(1), Arc::new(Store::default()), MailOp::Insert);
        mailbox.post(core(2), Arc::new(Store::default()), MailOp::Move);
        let drained = mailbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].op, MailOp::Insert);
        assert_eq!(drained[1].op, MailOp::Move);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn wait_timeout_returns_false_when_nothing_arrives() {
        let mailbox = Mailbox::new();
        assert!(!mailbox.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn wait_timeout_wakes_promptly_when_mail_posted_from_another_thread() {
        let mailbox = Arc::new(Mailbox::new());
        let barrier = Arc::new(Barrier::new(2));
        let mb = Arc::clone(&mailbox);
        let b = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            b.wait();
            mb.post(core(1), Arc::new(Store::default()), MailOp::Dying);
        });
        barrier.wait();
        let woken = mailbox.wait_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(woken);
        assert_eq!(mailbox.drain().len(), 1);
    }
}
