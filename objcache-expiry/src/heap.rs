//! The 4-ary expiry min-heap (spec §4.4: "4-heap layout for
//! cache-friendliness"; Glossary: "4-ary min-heap of (ObjCore, 32-bit
//! deadline key)").
//!
//! Each entry carries the [`Store`] its `ObjCore` belongs to alongside
//! the core itself. This is the one place spec §3's "ObjCore ... pointer
//! to the owning Storage engine" field actually needs to be resolvable,
//! and keeping it in the heap entry (rather than on `ObjCore` itself)
//! lets `objcache-core` stay free of a dependency on
//! `objcache-backend::Stevedore` — see `DESIGN.md`.

use std::sync::Arc;

use objcache_backend::Store;
use objcache_core::ObjCore;

/// Converts a deadline in seconds-since-epoch, relative to `epoch_start`,
/// into a 32-bit heap key (spec's `BINHEAP_TIME2KEY`): negative becomes
/// `0`, anything past `u32::MAX` seconds saturates, everything else
/// rounds to the nearest whole second.
pub fn key_from_deadline(deadline: f64, epoch_start: f64) -> u32 {
    let rel = deadline - epoch_start;
    if rel <= 0.0 {
        0
    } else if rel >= u32::MAX as f64 {
        u32::MAX
    } else {
        (rel + 0.5) as u32
    }
}

struct Entry {
    core: Arc<ObjCore>,
    store: Arc<Store>,
    key: u32,
}

/// A 4-ary min-heap over `(ObjCore, Store, key)` triples, back-pointer
/// indexed so `reorder`/`delete` are `O(log n)` given just the `ObjCore`
/// (via [`ObjCore::heap_slot`]).
#[derive(Default)]
pub struct ExpiryHeap {
    entries: Vec<Entry>,
}

impl ExpiryHeap {
    /// An empty heap.
    pub fn new() -> Self {
        ExpiryHeap { entries: Vec::new() }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the heap holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parent(i: usize) -> Option<usize> {
        if i == 0 { None } else { Some((i - 1) / 4) }
    }

    fn children(i: usize) -> std::ops::Range<usize> {
        (4 * i + 1)..(4 * i + 5)
    }

    fn set_slot(&mut self, i: usize) {
        self.entries[i].core.set_heap_slot(Some(i));
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.set_slot(a);
        self.set_slot(b);
    }

    fn sift_up(&mut self, mut i: usize) {
        while let Some(p) = Self::parent(i) {
            if self.entries[i].key < self.entries[p].key {
                self.swap(i, p);
                i = p;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let mut smallest = i;
            for c in Self::children(i) {
                if c < self.entries.len() && self.entries[c].key < self.entries[smallest].key {
                    smallest = c;
                }
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    /// Inserts `core` (owned by `store`) with deadline key `key`.
    pub fn insert(&mut self, core: Arc<ObjCore>, store: Arc<Store>, key: u32) {
        let idx = self.entries.len();
        core.set_heap_slot(Some(idx));
        self.entries.push(Entry { core, store, key });
        self.sift_up(idx);
    }

    /// Changes the key of the entry at `core`'s current heap slot. A
    /// no-op if `core` is not currently in the heap.
    pub fn reorder(&mut self, core: &Arc<ObjCore>, new_key: u32) {
        let Some(idx) = core.heap_slot() else { return };
        let old_key = self.entries[idx].key;
        self.entries[idx].key = new_key;
        if new_key < old_key {
            self.sift_up(idx);
        } else {
            self.sift_down(idx);
        }
    }

    /// Removes `core` from the heap entirely, wherever it sits. A no-op
    /// if it isn't present.
    pub fn delete(&mut self, core: &Arc<ObjCore>) -> bool {
        let Some(idx) = core.heap_slot() else {
            return false;
        };
        let last = self.entries.len() - 1;
        if idx != last {
            self.swap(idx, last);
        }
        let removed = self.entries.pop().expect("heap non-empty by construction");
        removed.core.set_heap_slot(None);
        if idx < self.entries.len() {
            let parent_key = Self::parent(idx).map(|p| self.entries[p].key);
            if parent_key.is_some_and(|pk| self.entries[idx].key < pk) {
                self.sift_up(idx);
            } else {
                self.sift_down(idx);
            }
        }
        true
    }

    /// The minimum-key entry, without removing it.
    pub fn root(&self) -> Option<(Arc<ObjCore>, Arc<Store>, u32)> {
        self.entries
            .first()
            .map(|e| (Arc::clone(&e.core), Arc::clone(&e.store), e.key))
    }

    /// Removes and returns the minimum-key entry.
    pub fn pop_root(&mut self) -> Option<(Arc<ObjCore>, Arc<Store>, u32)> {
        let (core, store, key) = self.root()?;
        self.delete(&core);
        Some((core, store, key))
    }

    /// Drains every entry, for the epoch-reset path (spec §4.4: "the
    /// thread drains every entry ... the epoch is reset ... each is
    /// re-inserted with a refreshed key").
    pub fn drain_all(&mut self) -> Vec<(Arc<ObjCore>, Arc<Store>, u32)> {
        let drained: Vec<_> = self
            .entries
            .drain(..)
            .map(|e| {
                e.core.set_heap_slot(None);
                (e.core, e.store, e.key)
            })
            .collect();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcache_core::ObjFlags;

    fn core(id: u64) -> Arc<ObjCore> {
        let oc = ObjCore::new_busy(id);
        oc.with_flags_mut(|f| f.remove(ObjFlags::BUSY));
        oc
    }

    #[test]
    fn root_is_always_minimum_key() {
        let mut heap = ExpiryHeap::new();
        let store = Arc::new(Store::default());
        let keys = [50u32, 10, 40, 20, 5, 30];
        for (i, &k) in keys.iter().enumerate() {
            heap.insert(core(i as u64), Arc::clone(&store), k);
        }
        let (_, _, root_key) = heap.root().unwrap();
        assert_eq!(root_key, 5);
    }

    #[test]
    fn pop_root_repeatedly_yields_sorted_keys() {
        let mut heap = ExpiryHeap::new();
        let store = Arc::new(Store::default());
        let keys = [50u32, 10, 40, 20, 5, 30];
        for (i, &k) in keys.iter().enumerate() {
            heap.insert(core(i as u64), Arc::clone(&store), k);
        }
        let mut popped = Vec::new();
        while let Some((_, _, k)) = heap.pop_root() {
            popped.push(k);
        }
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        assert_eq!(popped, sorted);
    }

    #[test]
    fn delete_of_non_root_preserves_heap_property() {
        let mut heap = ExpiryHeap::new();
        let store = Arc::new(Store::default());
        let mut cores = Vec::new();
        for (i, &k) in [5u32, 10, 15, 20, 25, 30, 35].iter().enumerate() {
            let c = core(i as u64);
            heap.insert(Arc::clone(&c), Arc::clone(&store), k);
            cores.push(c);
        }
        heap.delete(&cores[3]); // key 20, not root
        let mut popped = Vec::new();
        while let Some((_, _, k)) = heap.pop_root() {
            popped.push(k);
        }
        assert_eq!(popped, vec![5, 10, 15, 25, 30, 35]);
    }

    #[test]
    fn reorder_to_smaller_key_can_become_new_root() {
        let mut heap = ExpiryHeap::new();
        let store = Arc::new(Store::default());
        let a = core(1);
        let b = core(2);
        heap.insert(Arc::clone(&a), Arc::clone(&store), 100);
        heap.insert(Arc::clone(&b), Arc::clone(&store), 200);
        heap.reorder(&b, 1);
        let (root_core, _, root_key) = heap.root().unwrap();
        assert_eq!(root_core.id(), b.id());
        assert_eq!(root_key, 1);
    }

    #[test]
    fn key_from_deadline_clamps_and_rounds() {
        assert_eq!(key_from_deadline(-5.0, 0.0), 0);
        assert_eq!(key_from_deadline(10.4, 0.0), 10);
        assert_eq!(key_from_deadline(10.6, 0.0), 11);
        assert_eq!(key_from_deadline(1_000.0, 990.0), 10);
    }

    #[test]
    fn drain_all_empties_heap_and_clears_slots() {
        let mut heap = ExpiryHeap::new();
        let store = Arc::new(Store::default());
        let a = core(1);
        heap.insert(Arc::clone(&a), store, 5);
        let drained = heap.drain_all();
        assert_eq!(drained.len(), 1);
        assert!(heap.is_empty());
        assert_eq!(a.heap_slot(), None);
    }
}
