//! The [`Stevedore`] storage engine trait (spec §4.2, "Storage engine
//! interface").
//!
//! "Stevedore" is the Varnish project's own name for a storage engine —
//! the dockworker that loads and unloads cargo (bytes) from a ship (the
//! cache). We keep the name; it's the term every engine implementation in
//! this family (`objcache-storage-file`, `objcache-storage-malloc`,
//! `objcache-storage-transient`) and anyone reading the original C will
//! recognize.

use std::sync::Arc;

use objcache_core::{CoreResult, Segment};

use crate::lru::Store;

/// Capability set a storage engine may optionally implement beyond
/// `alloc`/`free`/`open`/`close` (spec §4.2: "Optionally: `trim`, …,
/// body-oriented shortcuts, … `getattr/setattr`, … `iterator`").
///
/// Every method here has a default that falls back to walking the
/// object's segment list via `alloc`/`free`, so an engine only overrides
/// what it can do better.
pub trait Stevedore: Send + Sync {
    /// Short, stable name for diagnostics, tracing and the per-engine
    /// gauge namespace (e.g. `"malloc"`, `"file:/var/cache/varnish"`).
    fn name(&self) -> &str;

    /// This engine's LRU list and gauges.
    fn store(&self) -> &Store;

    /// Allocates a new segment able to hold at least `size` bytes,
    /// returning `None` if the engine has no room (callers escalate to
    /// [`nuke_one`](crate::lru::LruList::nuke_one_where) up to
    /// `nuke_limit` retries, per spec §4.2 "Failure").
    fn alloc(&self, size: usize) -> Option<Segment>;

    /// Returns a segment's unused tail capacity to the engine, shrinking
    /// `space` down to `new_len`. Default: a no-op (the segment simply
    /// keeps its over-allocation until freed).
    fn trim(&self, _segment: &mut Segment, _new_len: usize) {}

    /// Lifecycle hook called once when the engine is registered.
    fn open(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Lifecycle hook called once when the engine is being torn down. No
    /// live segments may remain.
    fn close(&self) {}

    /// Whether this engine is the well-known transient store (spec §4.2,
    /// §6: "The transient store is reserved under the ident
    /// `\"Transient\"`"). Used by the facade to route short-TTL objects
    /// automatically.
    fn is_transient(&self) -> bool {
        false
    }
}

/// The well-known name of the transient storage engine (spec §6).
pub const TRANSIENT_IDENT: &str = "Transient";

/// Shared handle to a registered engine.
pub type StevedoreHandle = Arc<dyn Stevedore>;
