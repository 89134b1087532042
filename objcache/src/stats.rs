//! Process-wide counters (spec §6, "Counters"), as seen by a caller outside
//! the core: the aggregated [`GlobalCounters`](objcache_core::GlobalCounters)
//! plus each registered storage engine's gauges, gathered into one
//! snapshot struct so a metrics exporter has one thing to poll.

use std::sync::Arc;

use objcache_backend::Stevedore;
use objcache_core::GlobalCounters;

/// A point-in-time read of every counter spec §6 names.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    /// Live `Object` count.
    pub n_object: i64,
    /// Live `ObjCore` count.
    pub n_objectcore: i64,
    /// Live `ObjHead` count.
    pub n_objecthead: i64,
    /// LRU touches applied.
    pub n_lru_moved: i64,
    /// Objects evicted under storage pressure.
    pub n_lru_nuked: i64,
    /// Objects expired off the heap.
    pub n_expired: i64,
    /// Bans that matched a lookup candidate.
    pub n_ban: i64,
    /// Current waiting-list depth, summed across all heads.
    pub n_waitinglist: i64,
    /// Mail posted to the expiry engine.
    pub exp_mailed: i64,
    /// Mail drained by the expiry engine.
    pub exp_received: i64,
}

impl Snapshot {
    fn from_global(g: &GlobalCounters) -> Self {
        Snapshot {
            n_object: g.n_object(),
            n_objectcore: g.n_objectcore(),
            n_objecthead: g.n_objecthead(),
            n_lru_moved: g.n_lru_moved(),
            n_lru_nuked: g.n_lru_nuked(),
            n_expired: g.n_expired(),
            n_ban: g.n_ban(),
            n_waitinglist: g.n_waitinglist(),
            exp_mailed: g.exp_mailed(),
            exp_received: g.exp_received(),
        }
    }
}

/// A storage engine's per-store gauges, named for the ident it was
/// registered under (spec §6: `g_bytes`, `g_space`, `g_alloc`, `g_smf`,
/// `g_smf_frag`, `g_smf_large`).
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// The engine's registered name.
    pub name: String,
    /// Bytes actually used by live segments.
    pub g_bytes: i64,
    /// Bytes reserved from the engine.
    pub g_space: i64,
    /// Successful allocations.
    pub g_alloc: i64,
}

/// Reads `global` and every engine in `engines` into one snapshot.
pub fn snapshot(global: &GlobalCounters, engines: &[Arc<dyn Stevedore>]) -> (Snapshot, Vec<StoreSnapshot>) {
    let stores = engines
        .iter()
        .map(|e| {
            let gauges = &e.store().gauges;
            StoreSnapshot {
                name: e.name().to_string(),
                g_bytes: gauges.bytes(),
                g_space: gauges.space(),
                g_alloc: gauges.allocs(),
            }
        })
        .collect();
    (Snapshot::from_global(global), stores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{self, StevedoreSpec};

    #[test]
    fn snapshot_reads_global_and_per_store_gauges() {
        let global = GlobalCounters::default();
        let engine = storage::open(StevedoreSpec::Malloc { size: None }).unwrap();
        let _segment = engine.alloc(128).unwrap();

        let (totals, stores) = snapshot(&global, std::slice::from_ref(&engine));
        assert_eq!(totals.n_object, 0);
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].name, "malloc");
        assert_eq!(stores[0].g_alloc, 1);
    }
}
