//! Process-wide counters (spec §6, "Counters"; §9, "Global counters").
//!
//! One [`Counters`] struct per worker thread, aggregated into
//! [`GlobalCounters`] on a periodic flush rather than incremented directly
//! on shared atomics from the hot path (spec §9: "Never increment shared
//! counters on the hot path without batching").

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Padding to a cache line so adjacent workers' counters don't false-share.
#[repr(align(64))]
#[derive(Default)]
struct Padded<T>(T);

/// Per-worker-thread counters, cheap (non-atomic) increments since each
/// worker owns its own instance.
#[derive(Default)]
pub struct Counters {
    pub n_object: u64,
    pub n_objectcore: u64,
    pub n_objecthead: u64,
    pub n_lru_moved: u64,
    pub n_lru_nuked: u64,
    pub n_expired: u64,
    pub n_ban: u64,
    pub n_waitinglist: i64,
    pub exp_mailed: u64,
    pub exp_received: u64,
}

impl Counters {
    /// A fresh, zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds this worker's deltas into `dst` and resets this worker back
    /// to zero, as a periodic flush would.
    pub fn drain_into(&mut self, dst: &GlobalCounters) {
        dst.n_object.fetch_add(self.n_object as i64, Ordering::Relaxed);
        dst.n_objectcore
            .fetch_add(self.n_objectcore as i64, Ordering::Relaxed);
        dst.n_objecthead
            .fetch_add(self.n_objecthead as i64, Ordering::Relaxed);
        dst.n_lru_moved
            .fetch_add(self.n_lru_moved as i64, Ordering::Relaxed);
        dst.n_lru_nuked
            .fetch_add(self.n_lru_nuked as i64, Ordering::Relaxed);
        dst.n_expired.fetch_add(self.n_expired as i64, Ordering::Relaxed);
        dst.n_ban.fetch_add(self.n_ban as i64, Ordering::Relaxed);
        dst.n_waitinglist
            .fetch_add(self.n_waitinglist, Ordering::Relaxed);
        dst.exp_mailed.fetch_add(self.exp_mailed as i64, Ordering::Relaxed);
        dst.exp_received
            .fetch_add(self.exp_received as i64, Ordering::Relaxed);
        *self = Counters::default();
    }
}

/// Process totals, one atomic field per counter in the spec §6 table (plus
/// the per-store gauges, which live alongside each storage engine instead —
/// see `objcache_backend::lru::LruList::stats`).
#[derive(Default)]
pub struct GlobalCounters {
    n_object: AtomicI64,
    n_objectcore: AtomicI64,
    n_objecthead: AtomicI64,
    n_lru_moved: AtomicI64,
    n_lru_nuked: AtomicI64,
    n_expired: AtomicI64,
    n_ban: AtomicI64,
    n_waitinglist: AtomicI64,
    exp_mailed: AtomicI64,
    exp_received: AtomicI64,
}

macro_rules! getter {
    ($name:ident) => {
        /// Current aggregated value.
        pub fn $name(&self) -> i64 {
            self.$name.load(Ordering::Relaxed)
        }
    };
}

impl GlobalCounters {
    getter!(n_object);
    getter!(n_objectcore);
    getter!(n_objecthead);
    getter!(n_lru_moved);
    getter!(n_lru_nuked);
    getter!(n_expired);
    getter!(n_ban);
    getter!(n_waitinglist);
    getter!(exp_mailed);
    getter!(exp_received);

    /// Records a fresh `ObjHead` inserted into the index (spec §6:
    /// "Insert-then-delete of an ObjCore leaves `n_objectcore` unchanged").
    pub fn record_objecthead_created(&self) {
        self.n_objecthead.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an `ObjHead` removed from the index once empty.
    pub fn record_objecthead_destroyed(&self) {
        self.n_objecthead.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records a fresh `ObjCore` allocated for a `Miss` (spec §4.3).
    pub fn record_objectcore_created(&self) {
        self.n_objectcore.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an `ObjCore` torn down by `reap` (spec §3 lifecycle step 6).
    pub fn record_objectcore_destroyed(&self) {
        self.n_objectcore.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records an `Object` installed on a core by `finish_fetch`.
    pub fn record_object_installed(&self) {
        self.n_object.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an `Object` released by `reap`.
    pub fn record_object_destroyed(&self) {
        self.n_object.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records one LRU touch applied (spec §4.4, "Touch policy").
    pub fn record_lru_moved(&self) {
        self.n_lru_moved.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one eviction under storage pressure (spec §4.4, "Nuke-one").
    pub fn record_lru_nuked(&self) {
        self.n_lru_nuked.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one ban match against a lookup candidate (spec §4.6).
    pub fn record_ban(&self) {
        self.n_ban.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request parking on a busy `ObjHead`'s waiting list
    /// (spec §4.3 step 4).
    pub fn incr_waitinglist(&self) {
        self.n_waitinglist.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `n` previously parked waiters being woken at once (spec
    /// §4.3, "insert"/"abandon" contracts: "all waiters are rescheduled").
    pub fn decr_waitinglist_by(&self, n: i64) {
        self.n_waitinglist.fetch_sub(n, Ordering::Relaxed);
    }
}

/// A monotonically increasing transaction id source, used to stamp
/// `Object::xid` and tracing spans.
#[derive(Default)]
pub struct XidGenerator(AtomicU64);

impl XidGenerator {
    /// Allocates the next transaction id.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_into_moves_deltas_and_resets_worker() {
        let global = GlobalCounters::default();
        let mut worker = Counters::new();
        worker.n_expired = 3;
        worker.n_waitinglist = 2;
        worker.drain_into(&global);
        assert_eq!(global.n_expired(), 3);
        assert_eq!(global.n_waitinglist(), 2);
        assert_eq!(worker.n_expired, 0);

        worker.n_expired = 1;
        worker.drain_into(&global);
        assert_eq!(global.n_expired(), 4);
    }

    #[test]
    fn xid_generator_is_strictly_increasing() {
        let gen = XidGenerator::default();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }
}
