//! Storage segments (spec §3, "Storage segment").
//!
//! A segment is a contiguous byte range owned by exactly one storage
//! engine. `objcache-core` only knows the shape of a segment; the engines
//! that allocate and free them live in `objcache-backend` and its
//! implementation crates, which depend on this crate rather than the
//! other way around.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Narrow view of a storage engine, as seen from [`Segment`] itself: just
/// enough to name the owner (for `Debug`/tracing) and to give storage back
/// when a segment is dropped.
///
/// `objcache-backend::Stevedore` (the full allocation API: `alloc`, `trim`,
/// `open`/`close`, …) is a supertrait of this one. Keeping `Engine` minimal
/// and defined here, rather than pulling the whole `Stevedore` trait into
/// this crate, is what lets `objcache-core` stay independent of
/// `objcache-backend` while `Segment` still owns a live handle back to its
/// engine.
pub trait Engine: Send + Sync {
    /// Short engine name, e.g. `"malloc"`, `"file:/var/cache/varnish"`,
    /// `"transient"`.
    fn name(&self) -> &str;

    /// Returns a segment's storage to the engine. Called automatically
    /// when a [`Segment`] is dropped (see the `Drop` impl below) — this is
    /// the same operation as the `free(segment)` entry in the `Stevedore`
    /// contract (spec §4.2), just reached via RAII instead of an explicit
    /// call, since by the time a `Segment` value is dropped nothing else
    /// can reference its bytes.
    fn free_handle(&self, handle: u64, len: usize, space: usize);
}

/// A contiguous byte range inside a storage engine.
///
/// Append-only while its owning object is being fetched; immutable after
/// the fetch completes. `len` is the committed, readable prefix; `space`
/// is the total capacity the engine reserved (`len <= space`). `len` is
/// an atomic so a segment can be shared (behind an `Arc`) between the
/// single fetcher thread still extending it and any number of delivery
/// threads reading its committed prefix (spec §4.5, "Streaming
/// visibility"): the fetcher's `commit` uses a release store and readers'
/// `len`/`as_slice` an acquire load, so a reader that observes a given
/// `len` also observes every byte up to it.
pub struct Segment {
    engine: Arc<dyn Engine>,
    /// Opaque per-engine handle (a buddy-allocator offset for the
    /// file-backed engine, a `Vec<u8>` index for the malloc engine, …).
    handle: u64,
    ptr: *mut u8,
    len: AtomicUsize,
    space: usize,
}

// Segments are handed between the fetching thread and delivery threads
// under the invariants of spec §5: only the fetcher mutates `len`-worth of
// bytes, and readers only ever read the already-committed prefix.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Constructs a segment over raw engine-owned memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads/writes of `space` bytes for as long as
    /// this `Segment` (and any clones of the data it's handed off to) is
    /// alive, and must not be aliased by any other live `Segment`.
    pub unsafe fn new(engine: Arc<dyn Engine>, handle: u64, ptr: *mut u8, space: usize) -> Self {
        Segment {
            engine,
            handle,
            ptr,
            len: AtomicUsize::new(0),
            space,
        }
    }

    /// The engine that owns this segment's memory.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// The engine's opaque handle for this segment (used by `free`/`trim`).
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Bytes committed so far.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// True when nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total capacity reserved for this segment.
    pub fn space(&self) -> usize {
        self.space
    }

    /// Read-only view of the committed bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `space` bytes per the `new` contract,
        // and `len <= space` is an invariant maintained by `commit`/`trim`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len()) }
    }

    /// Mutable view of the *uncommitted* tail, for the fetcher to write
    /// into before calling [`commit`](Self::commit).
    ///
    /// Takes `&self`, not `&mut self`, so the fetcher can hold this
    /// segment behind the same `Arc` a concurrent delivery reads through;
    /// only the single thread driving a given fetch may ever call this or
    /// [`commit`](Self::commit) on it.
    pub fn uncommitted_mut(&self) -> &mut [u8] {
        let len = self.len();
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(len), self.space - len) }
    }

    /// Advances `len` by `n` after the fetcher has written into
    /// [`uncommitted_mut`](Self::uncommitted_mut). `n` must not exceed the
    /// remaining space.
    pub fn commit(&self, n: usize) {
        let prev = self.len.fetch_add(n, Ordering::Release);
        assert!(prev + n <= self.space, "segment commit past capacity");
    }

    /// Shrinks `space` to `new_len`, for the `trim` storage operation.
    /// `new_len` must be `<= space` and `>= len`.
    pub fn set_space(&mut self, new_len: usize) {
        assert!(new_len >= self.len() && new_len <= self.space);
        self.space = new_len;
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        self.engine.free_handle(self.handle, self.len(), self.space);
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("engine", &self.engine.name())
            .field("handle", &self.handle)
            .field("len", &self.len())
            .field("space", &self.space)
            .finish()
    }
}
