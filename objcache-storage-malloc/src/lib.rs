#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use objcache_backend::{Store, Stevedore};
use objcache_core::{CoreResult, Engine as SegmentEngine, Segment};
use parking_lot::Mutex;

/// Heap-backed storage engine: one boxed slice per segment, optionally
/// capped at a total byte budget (spec §4.2: "heap-backed (single-segment
/// slab per alloc)").
pub struct MallocEngine {
    name: String,
    store: Store,
    limit: Option<usize>,
    used: AtomicUsize,
    next_handle: AtomicU64,
    slabs: Mutex<HashMap<u64, Box<[u8]>>>,
    self_ref: Weak<MallocEngine>,
}

impl MallocEngine {
    /// Creates a new malloc engine named `name`, optionally capped at
    /// `limit` total bytes across all live segments (spec §6:
    /// "`malloc[,SIZE]`").
    pub fn new(name: impl Into<String>, limit: Option<usize>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| MallocEngine {
            name: name.into(),
            store: Store::default(),
            limit,
            used: AtomicUsize::new(0),
            next_handle: AtomicU64::new(1),
            slabs: Mutex::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// Reserves `size` bytes against the budget, returning `false` if the
    /// engine is capped and has no room.
    fn reserve(&self, size: usize) -> bool {
        let Some(limit) = self.limit else {
            self.used.fetch_add(size, Ordering::AcqRel);
            return true;
        };
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            if current.saturating_add(size) > limit {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                current + size,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn release(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }
}

impl SegmentEngine for MallocEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn free_handle(&self, handle: u64, len: usize, space: usize) {
        self.slabs.lock().remove(&handle);
        self.release(space);
        self.store.gauges.record_free(len, space);
    }
}

impl Stevedore for MallocEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn alloc(&self, size: usize) -> Option<Segment> {
        if !self.reserve(size) {
            tracing::debug!(engine = %self.name, size, "malloc alloc refused, over budget");
            return None;
        }
        let mut buf = vec![0u8; size].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.slabs.lock().insert(handle, buf);
        self.store.gauges.record_alloc(0, size);
        let engine: Arc<dyn SegmentEngine> = self.self_ref.upgrade()?;
        Some(unsafe { Segment::new(engine, handle, ptr, size) })
    }

    fn trim(&self, segment: &mut Segment, new_len: usize) {
        let freed = segment.space().saturating_sub(new_len);
        if freed == 0 {
            return;
        }
        segment.set_space(new_len);
        self.release(freed);
        self.store.gauges.record_trim(freed);
    }

    fn open(&self) -> CoreResult<()> {
        tracing::debug!(engine = %self.name, limit = ?self.limit, "malloc engine open");
        Ok(())
    }

    fn close(&self) {
        tracing::debug!(engine = %self.name, "malloc engine close");
    }
}
