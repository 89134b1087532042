//! Per-store LRU list (spec §3, "LRU list"; §4.4 "Touch policy"/"Nuke-one").
//!
//! A doubly linked list, intrusive in the sense that node positions are
//! cached directly on each [`ObjCore`] (`set_lru_slot`/`lru_slot`) so
//! removal given just an `Arc<ObjCore>` is O(1) rather than a scan.
//! Internally it is a slab (`Vec<Option<Node>>`) with a free list of
//! reusable slots, since Rust has no portable intrusive-list pointers
//! without `unsafe` linked structures.

use std::sync::Arc;

use objcache_core::ObjCore;
use parking_lot::Mutex;

use crate::gauges::Gauges;

struct Node {
    core: Arc<ObjCore>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>, // oldest
    tail: Option<usize>, // newest
    len: usize,
}

impl Inner {
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.slots[slot].as_ref().expect("unlink of empty slot");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    fn push_tail(&mut self, slot: usize) {
        let old_tail = self.tail;
        {
            let node = self.slots[slot].as_mut().unwrap();
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => self.slots[t].as_mut().unwrap().next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
    }

    fn alloc_slot(&mut self, core: Arc<ObjCore>) -> usize {
        let node = Node {
            core,
            prev: None,
            next: None,
        };
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }
}

/// A store's recency list: head is the oldest (next to be nuked), tail is
/// the most recently touched.
pub struct LruList {
    inner: Mutex<Inner>,
}

impl Default for LruList {
    fn default() -> Self {
        LruList {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                free: Vec::new(),
                head: None,
                tail: None,
                len: 0,
            }),
        }
    }
}

impl LruList {
    /// An empty LRU list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently linked.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `core` at the tail (most recently used position) and
    /// records its slot on the core itself.
    pub fn insert_tail(&self, core: &Arc<ObjCore>) {
        let mut inner = self.inner.lock();
        let slot = inner.alloc_slot(Arc::clone(core));
        inner.push_tail(slot);
        core.set_lru_slot(Some(slot));
    }

    /// Removes `core` from wherever it is in the list. A no-op if the core
    /// is not currently linked (its `lru_slot` is `None`).
    pub fn remove(&self, core: &Arc<ObjCore>) {
        let Some(slot) = core.lru_slot() else {
            return;
        };
        let mut inner = self.inner.lock();
        inner.unlink(slot);
        inner.slots[slot] = None;
        inner.free.push(slot);
        core.set_lru_slot(None);
    }

    /// Moves `core` to the tail if it is already linked (spec §4.4,
    /// "Touch policy"). Callers are responsible for the `lru_interval`
    /// throttle and the trylock-or-skip behavior described in the spec;
    /// this method always moves unconditionally when called.
    pub fn touch(&self, core: &Arc<ObjCore>) {
        let Some(slot) = core.lru_slot() else {
            return;
        };
        let mut inner = self.inner.lock();
        if inner.tail == Some(slot) {
            return;
        }
        inner.unlink(slot);
        inner.push_tail(slot);
    }

    /// Attempts the same as [`touch`](Self::touch) but only if the list's
    /// lock is immediately available, returning whether the touch
    /// happened. Spec §4.4: "Failure to move is harmless; it leaves the
    /// LRU mildly out of order, which is acceptable."
    pub fn try_touch(&self, core: &Arc<ObjCore>) -> bool {
        let Some(slot) = core.lru_slot() else {
            return false;
        };
        let Some(mut inner) = self.inner.try_lock() else {
            return false;
        };
        if inner.tail != Some(slot) {
            inner.unlink(slot);
            inner.push_tail(slot);
        }
        true
    }

    /// Scans from the head (oldest) looking for the first candidate for
    /// which `accept` returns `true`, removing and returning it. Used by
    /// `nuke_one` (spec §4.4): `accept` is expected to check refcount and
    /// try-lock the owning `ObjHead`.
    pub fn nuke_one_where(&self, accept: impl Fn(&Arc<ObjCore>) -> bool) -> Option<Arc<ObjCore>> {
        let mut inner = self.inner.lock();
        let mut cursor = inner.head;
        while let Some(slot) = cursor {
            let core = inner.slots[slot].as_ref().unwrap().core.clone();
            let next = inner.slots[slot].as_ref().unwrap().next;
            if accept(&core) {
                inner.unlink(slot);
                inner.slots[slot] = None;
                inner.free.push(slot);
                core.set_lru_slot(None);
                tracing::debug!(oc = core.id(), "nuke_one evicted candidate");
                return Some(core);
            }
            cursor = next;
        }
        None
    }
}

/// A storage engine's LRU list paired with its observability gauges.
#[derive(Default)]
pub struct Store {
    /// Recency list.
    pub lru: LruList,
    /// `g_bytes`/`g_space`/`g_alloc`/`g_smf*` gauges.
    pub gauges: Gauges,
}
