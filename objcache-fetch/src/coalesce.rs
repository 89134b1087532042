//! Ties a completed or failed fetch back into the index's
//! `finish_fetch`/`abandon_fetch` contract (spec §4.3 step 1, §4.5), so
//! every coalesced waiter on the `ObjHead` wakes to either a warm hit or
//! a fresh miss.

use std::sync::Arc;

use objcache_backend::Store;
use objcache_core::{Object, ObjCore, ObjHead};
use objcache_expiry::ExpiryEngine;
use objcache_index::ObjIndex;

/// What a completed fetch decided to do with the object it built.
pub enum Admission {
    /// Install the object as a normal cacheable entry.
    Cache { exp: objcache_core::Exp },
    /// Admit it as a hit-for-miss/hit-for-pass marker: flags and a short
    /// `Exp` are already set on `core` by the caller (spec §4.5).
    Uncacheable,
}

/// Completes a successful fetch: attaches `object` to `core`, applies the
/// admission decision, and runs the index's `finish_fetch` contract
/// (clears `BUSY`/`PRIVATE`, links into `store`'s LRU and the expiry
/// heap, wakes every waiter).
pub fn admit(
    index: &ObjIndex,
    head: &Arc<ObjHead>,
    core: Arc<ObjCore>,
    object: Object,
    admission: Admission,
    store: Arc<Store>,
    expiry: &ExpiryEngine,
) {
    if let Admission::Cache { exp } = admission {
        core.set_exp(exp);
    }
    core.set_object(Arc::new(object));
    index.finish_fetch(head, core, store, expiry);
}

/// Completes a failed fetch: runs the index's `abandon_fetch` contract
/// (marks `core` `DYING`, detaches it, wakes waiters so they retry).
pub fn abandon(index: &ObjIndex, head: &Arc<ObjHead>, core: &Arc<ObjCore>) {
    index.abandon_fetch(head, core);
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use objcache_core::{Digest, Exp, GlobalCounters};
    use objcache_expiry::SystemClock;
    use objcache_index::{LookupHints, LookupOutcome, LookupRequest};

    struct Req;
    impl LookupRequest for Req {
        fn vary_lookup(&self, _: &str) -> Option<&str> {
            None
        }
        fn can_revalidate(&self) -> bool {
            false
        }
    }

    #[test]
    fn admit_clears_busy_and_installs_object() {
        let index = ObjIndex::new();
        let bans = objcache_ban::BanList::new();
        let req = Req;

        let (head, outcome) = index.lookup(
            Digest::from_bytes([9; 32]),
            1_000.0,
            &req,
            &bans,
            |_| None,
            LookupHints::default(),
            None,
        );
        let core = match outcome {
            LookupOutcome::Miss(core) => core,
            _ => panic!("expected miss"),
        };

        let store = Arc::new(Store::default());
        let expiry = ExpiryEngine::start(Arc::new(SystemClock), Arc::new(GlobalCounters::default()));
        let object = Object::new(1, HeaderMap::new());

        admit(
            &index,
            &head,
            Arc::clone(&core),
            object,
            Admission::Cache {
                exp: Exp {
                    t_origin: 1_000.0,
                    ttl: 30.0,
                    grace: 5.0,
                    keep: 0.0,
                },
            },
            store,
            &expiry,
        );

        assert!(!core.is_busy());
        assert!(core.object().is_some());
        expiry.shutdown();
    }

    #[test]
    fn abandon_marks_core_dying() {
        let index = ObjIndex::new();
        let bans = objcache_ban::BanList::new();
        let req = Req;

        let (head, outcome) = index.lookup(
            Digest::from_bytes([10; 32]),
            1_000.0,
            &req,
            &bans,
            |_| None,
            LookupHints::default(),
            None,
        );
        let core = match outcome {
            LookupOutcome::Miss(core) => core,
            _ => panic!("expected miss"),
        };

        abandon(&index, &head, &core);
        assert!(core.is_dying());
    }
}
