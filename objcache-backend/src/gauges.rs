//! Per-store gauges (spec §6: `g_bytes`, `g_space`, `g_alloc`, `g_smf`,
//! `g_smf_frag`, `g_smf_large`).

use std::sync::atomic::{AtomicI64, Ordering};

/// Observability counters owned by one storage engine instance.
#[derive(Default)]
pub struct Gauges {
    /// Bytes actually used by live segments (`len`, not `space`).
    g_bytes: AtomicI64,
    /// Bytes reserved from the engine (`space`), live or not yet trimmed.
    g_space: AtomicI64,
    /// Number of successful `alloc` calls.
    g_alloc: AtomicI64,
    /// Free-list entries, for the file engine's buddy allocator (`0` for
    /// engines without a free list).
    g_smf: AtomicI64,
    /// Free-list entries considered "fragmented" (smaller than a page).
    g_smf_frag: AtomicI64,
    /// Free-list entries considered "large" (bucket 32, "32 or larger").
    g_smf_large: AtomicI64,
}

impl Gauges {
    /// Records a successful allocation of `space` bytes, of which `len` are
    /// immediately committed.
    pub fn record_alloc(&self, len: usize, space: usize) {
        self.g_alloc.fetch_add(1, Ordering::Relaxed);
        self.g_bytes.fetch_add(len as i64, Ordering::Relaxed);
        self.g_space.fetch_add(space as i64, Ordering::Relaxed);
    }

    /// Records a `free`, returning `space` bytes (and whatever `len` bytes
    /// were live) back to the engine.
    pub fn record_free(&self, len: usize, space: usize) {
        self.g_bytes.fetch_sub(len as i64, Ordering::Relaxed);
        self.g_space.fetch_sub(space as i64, Ordering::Relaxed);
    }

    /// Records a `trim` shrinking reserved space by `freed` bytes.
    pub fn record_trim(&self, freed: usize) {
        self.g_space.fetch_sub(freed as i64, Ordering::Relaxed);
    }

    /// Adjusts the live-bytes gauge without changing reserved space, for
    /// `commit`-style body growth within an already-allocated segment.
    pub fn record_commit(&self, delta: usize) {
        self.g_bytes.fetch_add(delta as i64, Ordering::Relaxed);
    }

    /// Sets the free-list gauges (file engine only).
    pub fn set_free_list(&self, total: i64, frag: i64, large: i64) {
        self.g_smf.store(total, Ordering::Relaxed);
        self.g_smf_frag.store(frag, Ordering::Relaxed);
        self.g_smf_large.store(large, Ordering::Relaxed);
    }

    /// Live bytes currently in use.
    pub fn bytes(&self) -> i64 {
        self.g_bytes.load(Ordering::Relaxed)
    }

    /// Total bytes reserved from the engine.
    pub fn space(&self) -> i64 {
        self.g_space.load(Ordering::Relaxed)
    }

    /// Successful allocation count.
    pub fn allocs(&self) -> i64 {
        self.g_alloc.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_nets_to_zero() {
        let g = Gauges::default();
        g.record_alloc(100, 128);
        assert_eq!(g.bytes(), 100);
        assert_eq!(g.space(), 128);
        g.record_free(100, 128);
        assert_eq!(g.bytes(), 0);
        assert_eq!(g.space(), 0);
    }
}
