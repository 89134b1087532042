//! [`ObjCore`] — the small in-index proxy for a cached [`Object`] (spec §3).

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::flags::ObjFlags;
use crate::object::Object;

/// Sentinel value meaning "not linked into this structure".
pub const NOT_LINKED: usize = usize::MAX;

/// The three additive freshness intervals plus the origin timestamp they're
/// measured from (spec Glossary: "TTL / grace / keep").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exp {
    /// When the response was received from the origin (seconds since the
    /// Unix epoch).
    pub t_origin: f64,
    /// Seconds the object is fresh for.
    pub ttl: f64,
    /// Seconds past `ttl` the object may still be served (stale-while-revalidate).
    pub grace: f64,
    /// Seconds past `ttl + grace` the object is retained for conditional
    /// (revalidating) fetches.
    pub keep: f64,
}

impl Exp {
    /// `t_origin + ttl` — end of the fresh window.
    pub fn fresh_until(&self) -> f64 {
        self.t_origin + self.ttl
    }

    /// `t_origin + ttl + grace` — end of the grace window.
    pub fn grace_until(&self) -> f64 {
        self.t_origin + self.ttl + self.grace
    }

    /// `t_origin + ttl + grace + keep` — the effective deadline used as the
    /// expiry-heap key (spec §3: "effective deadline").
    pub fn deadline(&self) -> f64 {
        self.t_origin + self.ttl + self.grace + self.keep
    }
}

/// The compact per-object entry held directly in the hash index.
///
/// Lifetime and linkage invariants are documented on each field; see spec
/// §3 and §8 for the full invariant list ("`DYING ⇒` not on LRU ∧ not in
/// expiry heap", refcount reaches zero exactly once, …).
pub struct ObjCore {
    id: u64,
    flags: Mutex<ObjFlags>,
    /// Logical reference count (spec: "Refcount ≥ number of active
    /// deliveries + one for the expiry engine while live + one for the
    /// fetcher while busy"). Distinct from any `Arc` strong count: reaching
    /// zero is an explicit event callers must act on (see
    /// [`ObjCore::decref`]), not implicit drop timing.
    refcount: AtomicUsize,
    /// Back-pointer to this core's LRU slot, owned by whichever storage
    /// engine's LRU list currently holds it. `NOT_LINKED` when absent
    /// (busy, or dying).
    lru_slot: AtomicUsize,
    /// Back-pointer to this core's slot in the expiry heap.
    heap_slot: AtomicUsize,
    exp: Mutex<Exp>,
    /// Last time (millis since Unix epoch) this core was moved to its
    /// LRU's tail, for `lru_interval` throttling.
    last_lru_ms: AtomicI64,
    /// Sequence number of the ban that was the ban list's tail when this
    /// core was inserted — the "reference-ban" of spec §3/§4.6. The ban
    /// list itself lives in `objcache-ban`; this crate only stores the
    /// opaque sequence number so there is no dependency cycle.
    ban_seq: AtomicU64,
    object: Mutex<Option<Arc<Object>>>,
    /// Bitfield cache of a subset of `flags` duplicated as an atomic for
    /// lock-free `is_dying`/`is_busy` checks on hot paths (lookup walks
    /// many candidates per request). Kept in sync by every flag mutation.
    flags_fast: AtomicU32,
}

impl ObjCore {
    /// Allocates a new `ObjCore` in `BUSY | PRIVATE` state, as the fetcher's
    /// target (spec §3, lifecycle step 1).
    pub fn new_busy(id: u64) -> Arc<Self> {
        let flags = ObjFlags::BUSY | ObjFlags::PRIVATE;
        Arc::new(ObjCore {
            id,
            flags: Mutex::new(flags),
            refcount: AtomicUsize::new(1), // the fetcher's reference
            lru_slot: AtomicUsize::new(NOT_LINKED),
            heap_slot: AtomicUsize::new(NOT_LINKED),
            exp: Mutex::new(Exp {
                t_origin: 0.0,
                ttl: -1.0,
                grace: 0.0,
                keep: 0.0,
            }),
            last_lru_ms: AtomicI64::new(0),
            ban_seq: AtomicU64::new(0),
            object: Mutex::new(None),
            flags_fast: AtomicU32::new(flags.bits()),
        })
    }

    /// Opaque identifier, stable for the lifetime of this core. Used for
    /// `Debug`/tracing only.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current flags.
    pub fn flags(&self) -> ObjFlags {
        ObjFlags::from_bits_truncate(self.flags_fast.load(Ordering::Acquire))
    }

    /// Lock-free dying check, safe to call without holding the owning
    /// ObjHead's mutex (used by LRU/expiry scans that only need to skip
    /// dying entries, not mutate them).
    pub fn is_dying(&self) -> bool {
        self.flags().contains(ObjFlags::DYING)
    }

    /// Lock-free busy check.
    pub fn is_busy(&self) -> bool {
        self.flags().contains(ObjFlags::BUSY)
    }

    /// Mutates flags under the per-core flag mutex, keeping the lock-free
    /// fast copy in sync. Callers needing flag + linkage atomicity (most
    /// transitions in spec §3/§4.3/§4.4) must additionally hold the owning
    /// `ObjHead`'s mutex; this method only protects the flag word itself.
    pub fn with_flags_mut<R>(&self, f: impl FnOnce(&mut ObjFlags) -> R) -> R {
        let mut guard = self.flags.lock();
        let r = f(&mut guard);
        self.flags_fast.store(guard.bits(), Ordering::Release);
        r
    }

    /// Marks this core `DYING`. Monotonic: a no-op if already dying.
    pub fn mark_dying(&self) {
        self.with_flags_mut(|f| f.insert(ObjFlags::DYING));
    }

    /// Increments the logical refcount.
    pub fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the logical refcount. Returns `true` exactly once, the
    /// first time the count reaches zero — callers must treat that as the
    /// signal to free the `Object`, detach from the `ObjHead`, and
    /// possibly free the `ObjHead` itself (spec §3, lifecycle step 6).
    ///
    /// # Panics
    ///
    /// If the refcount underflows (a double-decref bug upstream), since
    /// that is a `Fatal` invariant violation, not a recoverable condition.
    pub fn decref(&self) -> bool {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "ObjCore refcount underflow");
        prev == 1
    }

    /// Current refcount, for diagnostics and tests.
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// This core's LRU slot, or `None` if not linked into any LRU.
    pub fn lru_slot(&self) -> Option<usize> {
        match self.lru_slot.load(Ordering::Acquire) {
            NOT_LINKED => None,
            s => Some(s),
        }
    }

    /// Sets (or clears, with `None`) this core's LRU slot.
    pub fn set_lru_slot(&self, slot: Option<usize>) {
        self.lru_slot
            .store(slot.unwrap_or(NOT_LINKED), Ordering::Release);
    }

    /// This core's expiry-heap slot, or `None` if not in the heap.
    pub fn heap_slot(&self) -> Option<usize> {
        match self.heap_slot.load(Ordering::Acquire) {
            NOT_LINKED => None,
            s => Some(s),
        }
    }

    /// Sets (or clears) this core's expiry-heap slot.
    pub fn set_heap_slot(&self, slot: Option<usize>) {
        self.heap_slot
            .store(slot.unwrap_or(NOT_LINKED), Ordering::Release);
    }

    /// Current TTL/grace/keep/t_origin.
    pub fn exp(&self) -> Exp {
        *self.exp.lock()
    }

    /// Rewrites TTL/grace/keep/t_origin (the `rearm` operation, spec §4.4).
    pub fn set_exp(&self, exp: Exp) {
        *self.exp.lock() = exp;
    }

    /// Milliseconds-since-epoch of the last LRU touch.
    pub fn last_lru_ms(&self) -> i64 {
        self.last_lru_ms.load(Ordering::Acquire)
    }

    /// Records an LRU touch at `now_ms`.
    pub fn set_last_lru_ms(&self, now_ms: i64) {
        self.last_lru_ms.store(now_ms, Ordering::Release);
    }

    /// The ban sequence number this core was last checked against.
    pub fn ban_seq(&self) -> u64 {
        self.ban_seq.load(Ordering::Acquire)
    }

    /// Advances the reference-ban pointer (spec §4.6: "advance the
    /// ObjCore's reference-ban pointer to the current head").
    pub fn set_ban_seq(&self, seq: u64) {
        self.ban_seq.store(seq, Ordering::Release);
    }

    /// The backing `Object`, once the fetch has populated one. `None`
    /// while still busy and not yet committed.
    pub fn object(&self) -> Option<Arc<Object>> {
        self.object.lock().clone()
    }

    /// Installs the backing `Object` (end of a successful fetch).
    pub fn set_object(&self, object: Arc<Object>) {
        *self.object.lock() = Some(object);
    }

    /// Takes the backing `Object`, leaving `None` behind — used when the
    /// core's refcount reaches zero and its body storage must be freed.
    pub fn take_object(&self) -> Option<Arc<Object>> {
        self.object.lock().take()
    }
}

impl std::fmt::Debug for ObjCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjCore")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .field("refcount", &self.refcount())
            .finish()
    }
}
