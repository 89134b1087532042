//! The background expiry thread (spec §4.4): one per process, draining
//! the [`Mailbox`], sleeping until the heap root's deadline (or the next
//! mail, whichever comes first), and expiring objects as deadlines pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use objcache_backend::Store;
use objcache_core::{Counters, GlobalCounters, ObjCore, ObjFlags};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::events::{EventList, ExpiryEvent};
use crate::heap::{ExpiryHeap, key_from_deadline};
use crate::mailbox::{Mail, MailOp, Mailbox};

/// Longest the background thread ever sleeps even with an empty heap, so
/// a freshly-started engine notices shutdown requests promptly.
const MAX_SLEEP: Duration = Duration::from_secs(1);

/// Called when a core's refcount reaches zero as a result of being
/// expired off the heap; wired up by whichever crate owns object
/// teardown (`objcache-index`), since this crate doesn't depend on it.
pub type ReaperFn = Box<dyn Fn(&Arc<ObjCore>) + Send + Sync>;

struct Shared {
    heap: Mutex<ExpiryHeap>,
    mailbox: Mailbox,
    clock: Arc<dyn Clock>,
    epoch_start_bits: AtomicU64,
    events: EventList,
    counters: Mutex<Counters>,
    global_counters: Arc<GlobalCounters>,
    reaper: Mutex<Option<ReaperFn>>,
    stop: AtomicBool,
}

impl Shared {
    fn epoch_start(&self) -> f64 {
        f64::from_bits(self.epoch_start_bits.load(Ordering::Acquire))
    }

    fn set_epoch_start(&self, v: f64) {
        self.epoch_start_bits.store(v.to_bits(), Ordering::Release);
    }

    fn key_for(&self, core: &ObjCore) -> u32 {
        key_from_deadline(core.exp().deadline(), self.epoch_start())
    }
}

/// The expiry engine: owns the heap and mailbox, and runs one background
/// thread for their lifetime.
pub struct ExpiryEngine {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryEngine {
    /// Starts the engine with `clock` as its time source and
    /// `global_counters` as the aggregation target for its periodic
    /// counter flush.
    pub fn start(clock: Arc<dyn Clock>, global_counters: Arc<GlobalCounters>) -> Arc<Self> {
        let now = clock.now();
        let shared = Arc::new(Shared {
            heap: Mutex::new(ExpiryHeap::new()),
            mailbox: Mailbox::new(),
            clock,
            epoch_start_bits: AtomicU64::new(now.to_bits()),
            events: EventList::new(),
            counters: Mutex::new(Counters::new()),
            global_counters,
            reaper: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("objcache-expiry".into())
            .spawn(move || run(worker_shared))
            .expect("failed to spawn expiry thread");

        Arc::new(ExpiryEngine {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Registers the reaper callback invoked when an expired core's
    /// refcount reaches zero. Overwrites any previously registered one.
    pub fn set_reaper(&self, reaper: impl Fn(&Arc<ObjCore>) + Send + Sync + 'static) {
        *self.shared.reaper.lock() = Some(Box::new(reaper));
    }

    /// The event subscriber list, for registering metrics/test hooks.
    pub fn events(&self) -> &EventList {
        &self.shared.events
    }

    /// Posts `Insert` mail for a core newly eligible for the expiry heap.
    pub fn insert(&self, core: Arc<ObjCore>, store: Arc<Store>) {
        self.shared.mailbox.post(core, store, MailOp::Insert);
    }

    /// Posts `Move` mail after a `rearm` changed a core's deadline.
    pub fn rearm(&self, core: Arc<ObjCore>, store: Arc<Store>) {
        self.shared.mailbox.post(core, store, MailOp::Move);
    }

    /// Posts `Dying` mail to pull a core out of the heap immediately.
    pub fn mark_dying(&self, core: Arc<ObjCore>, store: Arc<Store>) {
        self.shared.mailbox.post(core, store, MailOp::Dying);
    }

    /// The touch-policy helper (spec §4.4): moves `core` to its store's
    /// LRU tail, but only if `lru_interval` has elapsed since the last
    /// touch and the LRU lock is immediately available. Returns whether
    /// the touch happened.
    pub fn touch_if_due(&self, core: &Arc<ObjCore>, store: &Store, now_ms: i64, lru_interval_ms: i64) -> bool {
        if now_ms.saturating_sub(core.last_lru_ms()) < lru_interval_ms {
            return false;
        }
        let touched = store.lru.try_touch(core);
        if touched {
            core.set_last_lru_ms(now_ms);
        }
        touched
    }

    /// Number of entries currently in the heap, for diagnostics and tests.
    pub fn heap_len(&self) -> usize {
        self.shared.heap.lock().len()
    }

    /// Blocks until the mailbox has been fully drained and the heap
    /// checked at least once. Test-only: lets deterministic tests using
    /// `ManualClock` synchronize with the background thread instead of
    /// racing it.
    #[doc(hidden)]
    pub fn settle(&self) {
        while !self.shared.mailbox.is_empty() {
            std::thread::yield_now();
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    /// Signals the background thread to stop and waits for it to exit.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.mailbox.post(
            ObjCore::new_busy(0),
            Arc::new(Store::default()),
            MailOp::Dying,
        );
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExpiryEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain_mailbox(shared: &Shared, heap: &mut ExpiryHeap, mail: Vec<Mail>) {
    if mail.is_empty() {
        return;
    }
    let mut counters = shared.counters.lock();
    for item in mail {
        counters.exp_received += 1;
        match item.op {
            MailOp::Insert => {
                let key = shared.key_for(&item.core);
                heap.insert(Arc::clone(&item.core), Arc::clone(&item.store), key);
                shared.events.notify(&item.core, ExpiryEvent::Inserted);
            }
            MailOp::Move => {
                if item.core.heap_slot().is_some() {
                    let key = shared.key_for(&item.core);
                    heap.reorder(&item.core, key);
                    shared.events.notify(&item.core, ExpiryEvent::Moved);
                } else if !item.core.is_dying() {
                    let key = shared.key_for(&item.core);
                    heap.insert(Arc::clone(&item.core), Arc::clone(&item.store), key);
                    shared.events.notify(&item.core, ExpiryEvent::Inserted);
                }
            }
            MailOp::Dying => {
                heap.delete(&item.core);
                item.store.lru.remove(&item.core);
            }
        }
    }
    counters.drain_into(&shared.global_counters);
}

/// Expires `core`, which the caller has already popped off the heap: marks
/// it dying, removes it from its LRU, fires the event, and decrefs it.
fn expire_one(shared: &Shared, core: Arc<ObjCore>, store: Arc<Store>) {
    core.with_flags_mut(|f| {
        f.insert(ObjFlags::DYING);
        f.insert(ObjFlags::OFFLRU);
    });
    store.lru.remove(&core);
    shared.events.notify(&core, ExpiryEvent::Expired);
    shared.counters.lock().n_expired += 1;
    tracing::debug!(oc = core.id(), "object expired");
    if core.decref() {
        if let Some(reaper) = shared.reaper.lock().as_ref() {
            reaper(&core);
        }
    }
}

/// Drains every heap entry, expiring any whose deadline has already
/// passed and re-inserting the rest with a key relative to a freshly
/// reset epoch (spec §4.4: epoch reset keeps 32-bit keys from
/// overflowing indefinitely).
fn reset_epoch(shared: &Shared, heap: &mut ExpiryHeap, now: f64) {
    let entries = heap.drain_all();
    shared.set_epoch_start(now);
    for (core, store, _old_key) in entries {
        if core.is_dying() || core.exp().deadline() <= now {
            expire_one(shared, core, store);
        } else {
            let key = shared.key_for(&core);
            heap.insert(core, store, key);
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        if shared.stop.load(Ordering::Acquire) {
            return;
        }

        let mail = shared.mailbox.drain();
        {
            let mut heap = shared.heap.lock();
            drain_mailbox(&shared, &mut heap, mail);
        }

        if shared.stop.load(Ordering::Acquire) {
            return;
        }

        let now = shared.clock.now();
        // Epoch reset once the live key space has used up more than
        // three quarters of its 32-bit range, well before it could wrap.
        if now - shared.epoch_start() > (u32::MAX as f64) * 0.75 {
            let mut heap = shared.heap.lock();
            reset_epoch(&shared, &mut heap, now);
        }

        let sleep_for = {
            let mut heap = shared.heap.lock();
            match heap.root() {
                Some((core, store, key)) => {
                    let deadline = shared.epoch_start() + key as f64;
                    if deadline <= now {
                        // Re-verify the live deadline: a rearm may have
                        // lengthened it after the key was computed.
                        let live_deadline = core.exp().deadline();
                        if core.is_dying() || live_deadline <= now {
                            heap.delete(&core);
                            drop(heap);
                            expire_one(&shared, core, store);
                        } else {
                            let new_key = shared.key_for(&core);
                            heap.reorder(&core, new_key);
                        }
                        Duration::ZERO
                    } else {
                        Duration::from_secs_f64((deadline - now).min(MAX_SLEEP.as_secs_f64()))
                    }
                }
                None => MAX_SLEEP,
            }
        };

        if sleep_for > Duration::ZERO {
            shared.mailbox.wait_timeout(sleep_for);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use objcache_core::Exp;

    fn cacheable_core(id: u64, exp: Exp) -> Arc<ObjCore> {
        let oc = ObjCore::new_busy(id);
        oc.with_flags_mut(|f| f.remove(ObjFlags::BUSY));
        oc.set_exp(exp);
        oc
    }

    #[test]
    fn inserted_core_expires_once_deadline_passes() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let engine = ExpiryEngine::start(clock.clone(), Arc::new(GlobalCounters::default()));
        let store = Arc::new(Store::default());
        let core = cacheable_core(
            1,
            Exp {
                t_origin: 1_000.0,
                ttl: 1.0,
                grace: 0.0,
                keep: 0.0,
            },
        );
        store.lru.insert_tail(&core);
        engine.insert(Arc::clone(&core), Arc::clone(&store));
        engine.settle();
        assert!(!core.is_dying());

        clock.advance(2.0);
        // Nudge the background thread: post harmless mail for a second
        // core so the drain loop wakes and re-checks the heap root.
        let other = cacheable_core(
            2,
            Exp {
                t_origin: 2_000.0,
                ttl: 100.0,
                grace: 0.0,
                keep: 0.0,
            },
        );
        engine.insert(Arc::clone(&other), Arc::clone(&store));
        engine.settle();
        std::thread::sleep(Duration::from_millis(50));

        assert!(core.is_dying());
        assert_eq!(core.lru_slot(), None);
        engine.shutdown();
    }

    #[test]
    fn dying_mail_removes_core_from_heap_without_expiring_others() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let engine = ExpiryEngine::start(clock, Arc::new(GlobalCounters::default()));
        let store = Arc::new(Store::default());
        let core = cacheable_core(
            1,
            Exp {
                t_origin: 1_000.0,
                ttl: 500.0,
                grace: 0.0,
                keep: 0.0,
            },
        );
        engine.insert(Arc::clone(&core), Arc::clone(&store));
        engine.settle();
        assert_eq!(engine.heap_len(), 1);

        engine.mark_dying(Arc::clone(&core), store);
        engine.settle();
        assert_eq!(engine.heap_len(), 0);
        engine.shutdown();
    }

    #[test]
    fn touch_if_due_respects_interval_and_moves_core_in_lru() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let engine = ExpiryEngine::start(clock, Arc::new(GlobalCounters::default()));
        let store = Store::default();
        let a = cacheable_core(1, Exp { t_origin: 0.0, ttl: -1.0, grace: 0.0, keep: 0.0 });
        let b = cacheable_core(2, Exp { t_origin: 0.0, ttl: -1.0, grace: 0.0, keep: 0.0 });
        store.lru.insert_tail(&a);
        store.lru.insert_tail(&b);

        assert!(!engine.touch_if_due(&a, &store, 100, 1_000));
        assert!(engine.touch_if_due(&a, &store, 5_000, 1_000));
        let nuked = store.lru.nuke_one_where(|_| true).unwrap();
        assert_eq!(nuked.id(), b.id());
        engine.shutdown();
    }

    #[test]
    fn reaper_runs_when_expired_cores_refcount_hits_zero() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let engine = ExpiryEngine::start(clock.clone(), Arc::new(GlobalCounters::default()));
        let reaped: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let reaped_clone = Arc::clone(&reaped);
        engine.set_reaper(move |core| reaped_clone.lock().push(core.id()));

        let store = Arc::new(Store::default());
        let core = cacheable_core(
            7,
            Exp {
                t_origin: 1_000.0,
                ttl: 1.0,
                grace: 0.0,
                keep: 0.0,
            },
        );
        engine.insert(Arc::clone(&core), Arc::clone(&store));
        engine.settle();

        clock.advance(5.0);
        let pinger = cacheable_core(
            8,
            Exp {
                t_origin: 6_000.0,
                ttl: 50.0,
                grace: 0.0,
                keep: 0.0,
            },
        );
        engine.insert(pinger, store);
        engine.settle();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(*reaped.lock(), vec![7]);
        engine.shutdown();
    }
}
