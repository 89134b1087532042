//! End-to-end: a ban inserted after an object is cached matches on the
//! next lookup, marking the cached entry `DYING` and forcing a fresh
//! miss instead of serving it, while `n_ban` records the match.

use std::sync::Arc;

use http::HeaderMap;
use objcache::{BanTargetFor, Core, Params};
use objcache_ban::{BanField, BanOp, BanPredicate, BanTarget};
use objcache_backend::Store;
use objcache_core::{Digest, Exp, Object, ObjCore};
use objcache_expiry::SystemClock;
use objcache_index::{LookupHints, LookupOutcome, LookupRequest};
use objcache_storage_malloc::MallocEngine;
use parking_lot::Mutex;

struct Req;
impl LookupRequest for Req {
    fn vary_lookup(&self, _header: &str) -> Option<&str> {
        None
    }
    fn can_revalidate(&self) -> bool {
        false
    }
}

struct CachedUrl(&'static str);
impl BanTarget for CachedUrl {
    fn url(&self) -> &str {
        self.0
    }
    fn header(&self, _: &str) -> Option<&str> {
        None
    }
    fn status(&self) -> u16 {
        200
    }
}

#[test]
fn ban_added_after_caching_kills_the_matching_entry_on_next_lookup() {
    let tracked_id: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
    let tracked_id_for_closure = Arc::clone(&tracked_id);
    let ban_target_for: BanTargetFor = Arc::new(move |core: &Arc<ObjCore>| {
        if *tracked_id_for_closure.lock() == Some(core.id()) {
            Some(Box::new(CachedUrl("/purge-me")) as Box<dyn BanTarget + Send>)
        } else {
            None
        }
    });

    let core_ctx = Core::new(
        Arc::new(Params::new()),
        Arc::new(SystemClock),
        vec![MallocEngine::new("malloc", None)],
        ban_target_for,
    );
    let digest = Digest::from_bytes([0x55; 32]);
    let req = Req;

    let (head, outcome) = core_ctx.lookup(digest, 1_000.0, &req, LookupHints::default(), None);
    let fetcher = match outcome {
        LookupOutcome::Miss(core) => core,
        _ => panic!("expected a cold miss"),
    };
    *tracked_id.lock() = Some(fetcher.id());

    let store = Arc::new(Store::default());
    core_ctx.admit_cacheable(
        &head,
        Arc::clone(&fetcher),
        Object::new(core_ctx.next_xid(), HeaderMap::new()),
        Exp {
            t_origin: 1_000.0,
            ttl: 300.0,
            grace: 0.0,
            keep: 0.0,
        },
        store,
    );

    // Before the ban exists, the object is a clean warm hit.
    let (head2, outcome2) = core_ctx.lookup(digest, 1_001.0, &req, LookupHints::default(), None);
    match outcome2 {
        LookupOutcome::Hit(core) => assert_eq!(core.id(), fetcher.id()),
        _ => panic!("expected a warm hit before any ban was added"),
    }
    core_ctx.release(digest, &head2);

    core_ctx.ban_add(
        vec![BanPredicate::literal(BanField::ReqUrl, BanOp::Eq, "/purge-me")],
        1_002.0,
    );

    let (head3, outcome3) = core_ctx.lookup(digest, 1_003.0, &req, LookupHints::default(), None);
    assert!(matches!(outcome3, LookupOutcome::Miss(_)));
    assert!(fetcher.is_dying());
    assert_eq!(core_ctx.counters().n_ban(), 1);

    if let LookupOutcome::Miss(new_fetcher) = outcome3 {
        core_ctx.abandon_fetch(&head3, &new_fetcher);
    }
    core_ctx.release(digest, &head3);
    core_ctx.release(digest, &head);
}
