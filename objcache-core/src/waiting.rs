//! The waiting list attached to an [`ObjHead`](crate::objhead::ObjHead)
//! (spec §3, "Waiting list").

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Why a parked waiter was woken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// The busy fetch finished (successfully or not); redo the lookup.
    Retry,
    /// The park deadline elapsed before a wakeup arrived.
    TimedOut,
}

struct SignalInner {
    reason: Option<WakeReason>,
}

/// A wakeup channel shared between one parked waiter and whoever wakes it.
pub struct ParkSignal {
    inner: Mutex<SignalInner>,
    condvar: Condvar,
}

impl ParkSignal {
    fn new() -> Arc<Self> {
        Arc::new(ParkSignal {
            inner: Mutex::new(SignalInner { reason: None }),
            condvar: Condvar::new(),
        })
    }

    /// Wakes the parked waiter with `reason`, if it hasn't already timed
    /// out. Idempotent.
    pub fn wake(&self, reason: WakeReason) {
        let mut inner = self.inner.lock();
        if inner.reason.is_none() {
            inner.reason = Some(reason);
        }
        self.condvar.notify_all();
    }

    /// Blocks the calling thread until woken or `deadline` elapses.
    /// Returns the reason, defaulting to [`WakeReason::TimedOut`] if the
    /// deadline elapsed with no wakeup.
    pub fn park_until(&self, deadline: Option<Instant>) -> WakeReason {
        let mut inner = self.inner.lock();
        loop {
            if let Some(reason) = inner.reason {
                return reason;
            }
            match deadline {
                None => self.condvar.wait(&mut inner),
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return WakeReason::TimedOut;
                    }
                    let timed_out = self.condvar.wait_for(&mut inner, dl - now).timed_out();
                    if timed_out && inner.reason.is_none() {
                        return WakeReason::TimedOut;
                    }
                }
            }
        }
    }
}

/// One parked request.
pub struct Waiter {
    signal: Arc<ParkSignal>,
    deadline: Option<Instant>,
}

impl Waiter {
    /// Blocks until woken by [`WaitingList::wake_all`] or the deadline
    /// elapses (spec §5, "Cancellation / timeouts": "Waiting-list parks
    /// support a deadline").
    pub fn park(&self) -> WakeReason {
        self.signal.park_until(self.deadline)
    }
}

/// FIFO of parked requests on one [`ObjHead`](crate::objhead::ObjHead).
///
/// At most one `WaitingList` exists per `ObjHead` (spec §3), but it can
/// hold arbitrarily many waiters.
#[derive(Default)]
pub struct WaitingList {
    entries: VecDeque<Arc<ParkSignal>>,
}

impl WaitingList {
    /// A fresh, empty waiting list.
    pub fn new() -> Self {
        WaitingList::default()
    }

    /// Number of currently parked waiters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any waiter is parked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parks a new waiter at the tail of the FIFO, returning a handle the
    /// caller parks on (outside the `ObjHead` mutex — this method only
    /// registers the entry, it does not block).
    pub fn register(&mut self, deadline: Option<Instant>) -> Waiter {
        let signal = ParkSignal::new();
        self.entries.push_back(Arc::clone(&signal));
        Waiter { signal, deadline }
    }

    /// Wakes every parked waiter with `reason` and empties the list (spec
    /// §4.3 insert/abandon contracts: "all waiters are rescheduled").
    pub fn wake_all(&mut self, reason: WakeReason) {
        for signal in self.entries.drain(..) {
            signal.wake(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wake_all_releases_every_parked_waiter() {
        let list = Arc::new(Mutex::new(WaitingList::new()));
        let mut waiters = Vec::new();
        for _ in 0..4 {
            waiters.push(list.lock().register(None));
        }
        assert_eq!(list.lock().len(), 4);

        let handles: Vec<_> = waiters
            .into_iter()
            .map(|w| thread::spawn(move || w.park()))
            .collect();

        // give threads a moment to actually park
        thread::sleep(Duration::from_millis(20));
        list.lock().wake_all(WakeReason::Retry);

        for h in handles {
            assert_eq!(h.join().unwrap(), WakeReason::Retry);
        }
    }

    #[test]
    fn park_with_deadline_times_out_without_a_wakeup() {
        let waiter = {
            let mut list = WaitingList::new();
            list.register(Some(Instant::now() + Duration::from_millis(10)))
        };
        assert_eq!(waiter.park(), WakeReason::TimedOut);
    }
}
