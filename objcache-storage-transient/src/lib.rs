#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

use std::sync::Arc;

use objcache_backend::{Store, Stevedore, TRANSIENT_IDENT};
use objcache_core::{CoreResult, Engine as SegmentEngine, Segment};
use objcache_storage_malloc::MallocEngine;

/// The transient store (spec §4.2, §6): an unbounded heap-backed engine
/// reserved under the well-known ident `"Transient"`, used automatically
/// for objects whose `ttl + grace + keep` falls below `shortlived`.
pub struct TransientEngine {
    inner: Arc<MallocEngine>,
}

impl TransientEngine {
    /// Creates the transient store. There is exactly one per process in
    /// normal operation; nothing stops a caller from making more, but the
    /// facade only ever routes to the one registered under
    /// [`TRANSIENT_IDENT`].
    pub fn new() -> Arc<Self> {
        Arc::new(TransientEngine {
            inner: MallocEngine::new(TRANSIENT_IDENT, None),
        })
    }
}

impl SegmentEngine for TransientEngine {
    fn name(&self) -> &str {
        TRANSIENT_IDENT
    }

    fn free_handle(&self, handle: u64, len: usize, space: usize) {
        self.inner.free_handle(handle, len, space);
    }
}

impl Stevedore for TransientEngine {
    fn name(&self) -> &str {
        TRANSIENT_IDENT
    }

    fn store(&self) -> &Store {
        self.inner.store()
    }

    fn alloc(&self, size: usize) -> Option<Segment> {
        self.inner.alloc(size)
    }

    fn trim(&self, segment: &mut Segment, new_len: usize) {
        self.inner.trim(segment, new_len);
    }

    fn open(&self) -> CoreResult<()> {
        self.inner.open()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn is_transient(&self) -> bool {
        true
    }
}

/// Renders built-in error page bodies without an origin fetch (spec §3:
/// "synthetic (error pages produced on demand)").
pub struct SyntheticEngine {
    inner: Arc<MallocEngine>,
}

impl SyntheticEngine {
    /// Creates the synthetic store.
    pub fn new() -> Arc<Self> {
        Arc::new(SyntheticEngine {
            inner: MallocEngine::new("synthetic", None),
        })
    }

    /// Renders a minimal plain-text error body, e.g. for a 503 produced
    /// because no backend was reachable. The returned segment is fully
    /// committed and ready to attach to an `Object`.
    pub fn render_error_page(&self, status: u16, reason: &str) -> Option<Segment> {
        let body = format!("{status} {reason}\n");
        let mut segment = self.inner.alloc(body.len())?;
        segment.uncommitted_mut()[..body.len()].copy_from_slice(body.as_bytes());
        segment.commit(body.len());
        Some(segment)
    }
}

impl SegmentEngine for SyntheticEngine {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn free_handle(&self, handle: u64, len: usize, space: usize) {
        self.inner.free_handle(handle, len, space);
    }
}

impl Stevedore for SyntheticEngine {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn store(&self) -> &Store {
        self.inner.store()
    }

    fn alloc(&self, size: usize) -> Option<Segment> {
        self.inner.alloc(size)
    }

    fn trim(&self, segment: &mut Segment, new_len: usize) {
        self.inner.trim(segment, new_len);
    }

    fn open(&self) -> CoreResult<()> {
        self.inner.open()
    }

    fn close(&self) {
        self.inner.close();
    }
}
