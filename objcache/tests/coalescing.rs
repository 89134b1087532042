//! End-to-end: ten concurrent requests for the same cold digest coalesce
//! behind a single fetch. Nine park on the waiting list (`n_waitinglist`
//! peaks at nine) and are all woken, and released, once the fetcher
//! admits the object.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use http::HeaderMap;
use objcache::{BanTargetFor, Core, Params};
use objcache_backend::Store;
use objcache_core::{Digest, Exp, Object, ObjCore};
use objcache_expiry::SystemClock;
use objcache_index::{LookupHints, LookupOutcome, LookupRequest};
use objcache_storage_malloc::MallocEngine;

struct Req;
impl LookupRequest for Req {
    fn vary_lookup(&self, _header: &str) -> Option<&str> {
        None
    }
    fn can_revalidate(&self) -> bool {
        false
    }
}

fn no_bans() -> BanTargetFor {
    Arc::new(|_: &Arc<ObjCore>| None)
}

fn ctx() -> Arc<Core> {
    Core::new(
        Arc::new(Params::new()),
        Arc::new(SystemClock),
        vec![MallocEngine::new("malloc", None)],
        no_bans(),
    )
}

#[test]
fn ten_concurrent_requests_coalesce_behind_one_fetch() {
    let core_ctx = ctx();
    let digest = Digest::from_bytes([0x22; 32]);

    let (head, outcome) = core_ctx.lookup(digest, 1_000.0, &Req, LookupHints::default(), None);
    let fetcher = match outcome {
        LookupOutcome::Miss(core) => core,
        _ => panic!("expected the first lookup to miss"),
    };

    let start = Arc::new(Barrier::new(9));
    let mut handles = Vec::new();
    for _ in 0..9 {
        let core_ctx = Arc::clone(&core_ctx);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            let (waiter_head, outcome) = core_ctx.lookup(digest, 1_000.2, &Req, LookupHints::default(), None);
            let woken = match outcome {
                LookupOutcome::Busy(waiter) => waiter.park(),
                _ => panic!("expected coalesced lookups to see the fetch as busy"),
            };
            core_ctx.release(digest, &waiter_head);
            woken
        }));
    }
    start.wait();

    // Give the coalescing threads a moment to register as parked before
    // asserting the waiting-list count and admitting the object.
    let mut waited = Duration::ZERO;
    while core_ctx.counters().n_waitinglist() < 9 && waited < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(5));
        waited += Duration::from_millis(5);
    }
    assert_eq!(core_ctx.counters().n_waitinglist(), 9);

    let store = Arc::new(Store::default());
    let object = Object::new(core_ctx.next_xid(), HeaderMap::new());
    core_ctx.admit_cacheable(
        &head,
        Arc::clone(&fetcher),
        object,
        Exp {
            t_origin: 1_000.0,
            ttl: 60.0,
            grace: 0.0,
            keep: 0.0,
        },
        store,
    );

    for handle in handles {
        handle.join().expect("coalesced thread panicked");
    }
    assert_eq!(core_ctx.counters().n_waitinglist(), 0);
    core_ctx.release(digest, &head);
}
