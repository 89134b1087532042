//! The hash table and the `lookup`/insert/abandon contracts (spec §4.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use objcache_ban::{BanList, BanTarget};
use objcache_backend::Store;
use objcache_core::{Digest, Exp, GlobalCounters, ObjCore, ObjFlags, ObjHead, WakeReason, Waiter};
use objcache_expiry::ExpiryEngine;

use crate::request::{LookupHints, LookupRequest};

/// What `lookup` resolved a digest to.
pub enum LookupOutcome {
    /// A fresh, grace, or keep-window candidate was found. The caller now
    /// holds one more reference on the core (via `incref`) and must
    /// eventually release it through normal `Object`/`ObjCore` teardown.
    Hit(Arc<ObjCore>),
    /// No usable candidate existed and no fetch was already running; a
    /// new `BUSY` core was installed on the head and the caller is now
    /// the fetcher for it.
    Miss(Arc<ObjCore>),
    /// A fresh `HFM`/`PASS` candidate was seen: the decision "this is
    /// uncacheable" is itself cached, so the caller should fetch
    /// privately (no coalescing, nothing new gets inserted on a plain
    /// miss) rather than parking behind it (spec §4.5).
    KnownUncacheable,
    /// A busy fetch was already running and this request coalesces onto
    /// it. The caller should `park()` the returned waiter (outside any
    /// lock) and re-run `lookup` once woken.
    Busy(Waiter),
}

/// The digest-keyed hash index.
pub struct ObjIndex {
    table: DashMap<Digest, Arc<ObjHead>>,
    next_core_id: AtomicU64,
    counters: Arc<GlobalCounters>,
}

impl Default for ObjIndex {
    fn default() -> Self {
        ObjIndex::with_counters(Arc::new(GlobalCounters::default()))
    }
}

impl ObjIndex {
    /// An empty index with its own private, unshared counters.
    pub fn new() -> Self {
        ObjIndex::default()
    }

    /// An empty index that records `n_ban`/`n_waitinglist` into the
    /// given, presumably process-wide, counters rather than a private
    /// set only this index ever reads.
    pub fn with_counters(counters: Arc<GlobalCounters>) -> Self {
        ObjIndex {
            table: DashMap::new(),
            next_core_id: AtomicU64::new(0),
            counters,
        }
    }

    /// Number of distinct digests currently tracked.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the index holds no heads.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Finds or creates the head for `digest`, incrementing its refcount
    /// for the caller's hold (spec §4.3 step 1).
    fn find_or_insert(&self, digest: Digest) -> Arc<ObjHead> {
        let counters = &self.counters;
        let head = self
            .table
            .entry(digest)
            .or_insert_with(|| {
                counters.record_objecthead_created();
                ObjHead::new(digest)
            })
            .clone();
        head.incref();
        head
    }

    /// Runs the full `lookup` contract (spec §4.3 steps 1-5).
    ///
    /// `ban_target_for` is consulted only for non-busy candidates that
    /// reach the ban-evaluation step; returning `None` (e.g. because the
    /// candidate has no `Object` yet) skips ban evaluation for that
    /// candidate rather than failing the lookup.
    pub fn lookup(
        &self,
        digest: Digest,
        now: f64,
        req: &impl LookupRequest,
        bans: &BanList,
        ban_target_for: impl Fn(&Arc<ObjCore>) -> Option<Box<dyn BanTarget>>,
        hints: LookupHints,
        park_deadline: Option<Instant>,
    ) -> (Arc<ObjHead>, LookupOutcome) {
        let head = self.find_or_insert(digest);
        let mut inner = head.lock();

        let mut pending_busy = false;
        let mut i = 0;
        while i < inner.cores.len() {
            let core = Arc::clone(&inner.cores[i]);

            if core.is_dying() {
                i += 1;
                continue;
            }

            if core.is_busy() && !hints.ignore_busy {
                pending_busy = true;
                i += 1;
                continue;
            }

            if let Some(object) = core.object() {
                if let Some(vary) = object.vary() {
                    if !vary.matches(|h| req.vary_lookup(h)) {
                        i += 1;
                        continue;
                    }
                }
            }

            if let Some(target) = ban_target_for(&core) {
                if bans.check(&core, target.as_ref()) {
                    self.counters.record_ban();
                    i += 1;
                    continue;
                }
            }

            let flags = core.flags();
            let exp = core.exp();
            if (flags.contains(ObjFlags::HFM) || flags.contains(ObjFlags::PASS)) && now < exp.fresh_until() {
                return (head, LookupOutcome::KnownUncacheable);
            }

            if now < exp.fresh_until() {
                core.incref();
                return (head, LookupOutcome::Hit(core));
            }
            if now < exp.grace_until() && inner.busy.is_some() {
                core.incref();
                return (head, LookupOutcome::Hit(core));
            }
            if now < exp.deadline() && req.can_revalidate() {
                core.incref();
                return (head, LookupOutcome::Hit(core));
            }

            i += 1;
        }

        if pending_busy && !hints.always_miss {
            let waiting = inner.waiting.get_or_insert_with(Default::default);
            let waiter = waiting.register(park_deadline);
            self.counters.incr_waitinglist();
            return (head, LookupOutcome::Busy(waiter));
        }

        let fetcher = ObjCore::new_busy(self.next_core_id.fetch_add(1, Ordering::Relaxed));
        inner.cores.insert(0, Arc::clone(&fetcher));
        inner.busy = Some(Arc::clone(&fetcher));
        self.counters.record_objectcore_created();
        (head, LookupOutcome::Miss(fetcher))
    }

    /// Insert contract (spec §4.3, "end of fetch"): clears `BUSY`/`PRIVATE`
    /// on `core` in one step that also links it into `store`'s LRU and the
    /// expiry heap, then wakes every parked waiter. Used both for a
    /// genuinely cacheable response and for a hit-for-miss/hit-for-pass
    /// admission (the caller is responsible for setting `HFM`/`PASS` and a
    /// short `Exp` on `core` before calling this for the latter).
    ///
    /// Lock order: caller already released the index lock; this method
    /// takes the `ObjHead` mutex, then (via `store`/`expiry`) the LRU and
    /// expiry-inbox locks, in that order.
    pub fn finish_fetch(&self, head: &Arc<ObjHead>, core: Arc<ObjCore>, store: Arc<Store>, expiry: &ExpiryEngine) {
        let mut inner = head.lock();
        core.with_flags_mut(|f| f.remove(ObjFlags::BUSY | ObjFlags::PRIVATE));
        store.lru.insert_tail(&core);
        expiry.insert(Arc::clone(&core), store);
        self.counters.record_object_installed();
        inner.busy = None;
        if let Some(waiting) = inner.waiting.as_mut() {
            let woken = waiting.len() as i64;
            waiting.wake_all(WakeReason::Retry);
            self.counters.decr_waitinglist_by(woken);
        }
        tracing::debug!(oc = core.id(), "fetch finished, object installed");
    }

    /// Abandon contract (spec §4.3, "fetch failed"): marks `core` `DYING`,
    /// detaches it from the head, and wakes waiters so they retry (each
    /// waiter's own re-lookup decides whether that means a fresh fetch or
    /// a propagated failure — there is no separate "fail" wake reason).
    pub fn abandon_fetch(&self, head: &Arc<ObjHead>, core: &Arc<ObjCore>) {
        let mut inner = head.lock();
        core.mark_dying();
        inner.cores.retain(|c| !Arc::ptr_eq(c, core));
        inner.busy = None;
        if let Some(waiting) = inner.waiting.as_mut() {
            let woken = waiting.len() as i64;
            waiting.wake_all(WakeReason::Retry);
            self.counters.decr_waitinglist_by(woken);
        }
        tracing::debug!(oc = core.id(), "fetch abandoned");
    }

    /// Detaches `core` from `head`'s candidate list (spec §3 lifecycle
    /// step 6, "detach ObjCore from ObjHead"), called once the core's
    /// refcount has reached zero.
    pub fn detach_core(&self, head: &Arc<ObjHead>, core: &Arc<ObjCore>) {
        let mut inner = head.lock();
        inner.cores.retain(|c| !Arc::ptr_eq(c, core));
    }

    /// Releases the caller's hold on `head` (taken by `lookup`), removing
    /// it from the table if it is now empty, unreferenced, and has no
    /// pending waiters or busy fetch (spec §3 lifecycle step 6).
    pub fn release(&self, digest: Digest, head: &Arc<ObjHead>) {
        if !head.decref() {
            return;
        }
        let inner = head.lock();
        let empty = inner.cores.is_empty()
            && inner.busy.is_none()
            && inner.waiting.as_ref().is_none_or(|w| w.is_empty());
        drop(inner);
        if empty && self.table.remove_if(&digest, |_, v| Arc::ptr_eq(v, head)).is_some() {
            self.counters.record_objecthead_destroyed();
        }
    }

    /// The minimum reference-ban sequence across every live, non-dying
    /// core, or `u64::MAX` if the index holds none — the `min_live_seq`
    /// the ban list's `gc` needs (spec §4.6: "until no object references
    /// a ban ≤ it").
    pub fn min_ban_seq(&self) -> u64 {
        let mut min = u64::MAX;
        for entry in self.table.iter() {
            let inner = entry.value().lock();
            for core in inner.cores.iter() {
                if !core.is_dying() {
                    min = min.min(core.ban_seq());
                }
            }
        }
        min
    }

    /// Tears down a core whose refcount reached zero from the expiry
    /// engine's own hold (spec §3 lifecycle step 6, reached via the
    /// `ExpiryEngine` reaper rather than `release`/`detach_core`, since
    /// nothing else was holding a reference to notice). Releases the
    /// backing `Object`'s segments and removes `core` from whichever head
    /// still lists it.
    pub fn reap(&self, core: &Arc<ObjCore>) {
        if core.take_object().is_some() {
            self.counters.record_object_destroyed();
        }
        self.counters.record_objectcore_destroyed();
        for entry in self.table.iter() {
            let head = Arc::clone(entry.value());
            let mut inner = head.lock();
            let before = inner.cores.len();
            inner.cores.retain(|c| !Arc::ptr_eq(c, core));
            if inner.cores.len() != before {
                return;
            }
        }
    }

    /// Every live, non-dying core whose reference-ban is older than
    /// `ref_seq`, across all heads — the ban lurker's raw candidate pool
    /// before a `BanTarget` adapter is applied (spec §4.6, lurker sweep).
    pub fn cores_with_stale_ban_ref(&self, ref_seq: u64) -> std::collections::VecDeque<Arc<ObjCore>> {
        let mut out = std::collections::VecDeque::new();
        for entry in self.table.iter() {
            let inner = entry.value().lock();
            for core in inner.cores.iter() {
                if !core.is_dying() && core.ban_seq() < ref_seq {
                    out.push_back(Arc::clone(core));
                }
            }
        }
        out
    }
}

/// A trivial `Exp` builder for short-TTL hit-for-miss/hit-for-pass
/// admissions (spec §4.5).
pub fn short_lived_exp(now: f64, ttl: f64) -> Exp {
    Exp {
        t_origin: now,
        ttl,
        grace: 0.0,
        keep: 0.0,
    }
}
