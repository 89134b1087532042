//! [`ObjHead`] — the per-digest rendezvous structure (spec §3).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::digest::Digest;
use crate::objcore::ObjCore;
use crate::waiting::WaitingList;

/// State protected by the `ObjHead` mutex: the candidate list, the optional
/// waiting list, and the optional currently-running busy core.
///
/// Lock order (spec §4.3/§5): index → **ObjHead** → LRU → expiry-inbox →
/// ban. Code holding this lock must not attempt to take the index lock.
#[derive(Default)]
pub struct ObjHeadInner {
    /// Candidate `ObjCore`s for this digest, newest first (spec §4.3:
    /// "Walk its ObjCore list from newest to oldest").
    pub cores: Vec<Arc<ObjCore>>,
    /// Parked requests waiting on the current busy fetch, if any.
    pub waiting: Option<WaitingList>,
    /// The single in-flight fetch for this head, if one is running (spec
    /// §3 invariant: "at most one BusyObject per ObjHead at a time" — we
    /// track busy-ness via the busy `ObjCore` itself rather than a
    /// separate `BusyObject` pointer, since the `BusyObject` lives in
    /// `objcache-fetch` and this crate cannot depend on it).
    pub busy: Option<Arc<ObjCore>>,
}

/// Per-digest rendezvous point: owns the candidate `ObjCore` list and the
/// optional waiting list for one cache key.
pub struct ObjHead {
    digest: Digest,
    /// Logical refcount distinct from `Arc`'s own strong count (same
    /// rationale as `ObjCore::refcount`): the hash index holds one ref
    /// while the head is in the table, and each returned lookup holds one
    /// more for as long as the caller needs it.
    refcount: AtomicUsize,
    inner: Mutex<ObjHeadInner>,
}

impl ObjHead {
    /// Creates a fresh, empty head for `digest` with one reference (the
    /// hash table's own).
    pub fn new(digest: Digest) -> Arc<Self> {
        Arc::new(ObjHead {
            digest,
            refcount: AtomicUsize::new(1),
            inner: Mutex::new(ObjHeadInner::default()),
        })
    }

    /// The digest this head was found/inserted under.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// Takes the `ObjHead` mutex. All candidate-list, waiting-list and
    /// busy-slot manipulation happens under this lock.
    pub fn lock(&self) -> MutexGuard<'_, ObjHeadInner> {
        self.inner.lock()
    }

    /// Increments the logical refcount (spec §4.3 step 1: "increment its
    /// refcount").
    pub fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the logical refcount. Returns `true` the moment it hits
    /// zero; the caller (the hash index) must then check whether the head
    /// is empty, has no waiters, and has no busy fetch, and if so remove
    /// it from the table (spec §3, lifecycle step 6).
    pub fn decref(&self) -> bool {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "ObjHead refcount underflow");
        prev == 1
    }

    /// Current refcount, for diagnostics and tests.
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ObjHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjHead")
            .field("digest", &self.digest)
            .field("refcount", &self.refcount())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_head_starts_with_one_ref_and_no_candidates() {
        let head = ObjHead::new(Digest::from_bytes([1; 32]));
        assert_eq!(head.refcount(), 1);
        assert!(head.lock().cores.is_empty());
    }

    #[test]
    fn decref_to_zero_reported_once() {
        let head = ObjHead::new(Digest::from_bytes([1; 32]));
        head.incref();
        assert!(!head.decref());
        assert!(head.decref());
    }
}
