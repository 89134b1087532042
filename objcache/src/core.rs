//! The process-wide caching context (spec §6): wires the hash index,
//! storage engines, the expiry engine and the ban subsystem behind the
//! external operations a worker calls — `lookup`, `beresp_cacheable`,
//! the `deliver_*` family (see [`crate::delivery`]), `rearm`, `touch`,
//! `ban_add`, `nuke_one`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use objcache_backend::{Store, Stevedore};
use objcache_ban::{BanList, BanLurker, BanPredicate, BanTarget, CandidateSource, LurkerCandidate};
use objcache_core::{Digest, Exp, GlobalCounters, Object, ObjCore, ObjFlags, ObjHead, XidGenerator};
use objcache_expiry::{Clock, ExpiryEngine};
use objcache_fetch::{Admission, BusyObject, abandon, admit};
use objcache_index::{LookupHints, LookupOutcome, LookupRequest, ObjIndex, short_lived_exp};
use objcache_policy::{CacheControl, Decision, beresp_cacheable, compute_exp};
use objcache_storage_transient::TransientEngine;

use crate::config::Params;

/// Builds a [`BanTarget`] for a candidate core, if it already has an
/// installed `Object` to evaluate predicates against; `None` skips ban
/// evaluation for that candidate rather than failing the lookup.
///
/// Supplied by the caller at construction, since only the caller knows
/// how to turn an `Object`'s headers and flags back into the request
/// URL/response status/header lookups a ban predicate tests (an `Object`
/// deliberately has no URL field of its own).
pub type BanTargetFor = Arc<dyn Fn(&Arc<ObjCore>) -> Option<Box<dyn BanTarget + Send>> + Send + Sync>;

/// The caching context: one per process.
///
/// Cheap to clone (it's handed around as `Arc<Core>`); every background
/// thread it starts (the expiry engine, the ban lurker) is shut down when
/// the last `Arc` is dropped.
pub struct Core {
    index: Arc<ObjIndex>,
    expiry: Arc<ExpiryEngine>,
    bans: Arc<BanList>,
    lurker: Arc<BanLurker>,
    params: Arc<Params>,
    clock: Arc<dyn Clock>,
    counters: Arc<GlobalCounters>,
    xids: XidGenerator,
    engines: Vec<Arc<dyn Stevedore>>,
    transient: Arc<dyn Stevedore>,
    ban_target_for: BanTargetFor,
    busy_objects: DashMap<u64, Arc<BusyObject>>,
}

impl Core {
    /// Builds a fresh context. `engines` is the set of persistent storage
    /// engines available for `lookup`'s caller to fetch into (see
    /// [`Core::engine_for`]); the well-known transient store (spec §6) is
    /// appended automatically if `engines` doesn't already include one.
    pub fn new(
        params: Arc<Params>,
        clock: Arc<dyn Clock>,
        mut engines: Vec<Arc<dyn Stevedore>>,
        ban_target_for: BanTargetFor,
    ) -> Arc<Self> {
        if !engines.iter().any(|e| e.is_transient()) {
            engines.push(TransientEngine::new());
        }
        let transient = engines
            .iter()
            .find(|e| e.is_transient())
            .cloned()
            .expect("a transient engine is always registered above");

        let counters = Arc::new(GlobalCounters::default());
        let index = Arc::new(ObjIndex::with_counters(Arc::clone(&counters)));
        let expiry = ExpiryEngine::start(Arc::clone(&clock), Arc::clone(&counters));
        let bans = Arc::new(BanList::new());

        let reaper_index = Arc::clone(&index);
        expiry.set_reaper(move |core| reaper_index.reap(core));

        let source = make_candidate_source(Arc::clone(&index), Arc::clone(&ban_target_for));
        let lurker_clock = Arc::clone(&clock);
        let lurker_index = Arc::clone(&index);
        let lurker = BanLurker::start(
            Arc::clone(&bans),
            source,
            params.lurker_config(),
            move || lurker_clock.now(),
            move || lurker_index.min_ban_seq(),
        );

        Arc::new(Core {
            index,
            expiry,
            bans,
            lurker,
            params,
            clock,
            counters,
            xids: XidGenerator::default(),
            engines,
            transient,
            ban_target_for,
            busy_objects: DashMap::new(),
        })
    }

    /// Runs the full `lookup` contract for `digest` at `now` (spec §4.3).
    pub fn lookup(
        &self,
        digest: Digest,
        now: f64,
        req: &impl LookupRequest,
        hints: LookupHints,
        park_deadline: Option<Instant>,
    ) -> (Arc<ObjHead>, LookupOutcome) {
        let ban_target_for = Arc::clone(&self.ban_target_for);
        self.index.lookup(
            digest,
            now,
            req,
            &self.bans,
            move |core| ban_target_for(core).map(|target| target as Box<dyn BanTarget>),
            hints,
            park_deadline,
        )
    }

    /// Releases the caller's hold on `head`, taken by [`Core::lookup`].
    pub fn release(&self, digest: Digest, head: &Arc<ObjHead>) {
        self.index.release(digest, head);
    }

    /// Decides whether a backend response may enter the cache at all
    /// (spec §6, `beresp_cacheable`).
    pub fn beresp_cacheable(
        &self,
        status: StatusCode,
        response_headers: &HeaderMap,
        request_headers: &HeaderMap,
    ) -> Decision {
        beresp_cacheable(status, response_headers, request_headers)
    }

    /// Computes the `Exp` a fresh response should be inserted with, given
    /// its headers and the current `default_ttl`/`default_grace`/`default_keep`.
    pub fn compute_exp(&self, headers: &HeaderMap, now: f64) -> Exp {
        let cc = CacheControl::parse(headers);
        compute_exp(headers, &cc, now, &self.params.ttl_defaults())
    }

    /// Whether `exp`'s full lifetime falls below the `shortlived`
    /// threshold (spec §6), meaning the object belongs in the transient
    /// store rather than a caller-chosen persistent engine.
    pub fn is_shortlived(&self, exp: &Exp) -> bool {
        exp.ttl + exp.grace + exp.keep < self.params.shortlived()
    }

    /// Chooses the storage engine a fresh fetch should allocate segments
    /// from: the transient store for short-lived objects, otherwise the
    /// first registered persistent engine.
    pub fn engine_for(&self, exp: &Exp) -> Arc<dyn Stevedore> {
        if self.is_shortlived(exp) {
            return Arc::clone(&self.transient);
        }
        self.engines
            .iter()
            .find(|e| !e.is_transient())
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.transient))
    }

    /// Registers a fresh [`BusyObject`] for `core`'s fetch (spec §3,
    /// "BusyObject"), so coalesced waiters can later find it via
    /// [`Core::busy_object`].
    pub fn begin_fetch(&self, core: &Arc<ObjCore>) -> Arc<BusyObject> {
        let busy = Arc::new(BusyObject::new());
        self.busy_objects.insert(core.id(), Arc::clone(&busy));
        busy
    }

    /// The `BusyObject` registered for `core`, if its fetch is still
    /// running (or has just finished and not yet been unregistered).
    pub fn busy_object(&self, core: &Arc<ObjCore>) -> Option<Arc<BusyObject>> {
        self.busy_objects.get(&core.id()).map(|entry| Arc::clone(entry.value()))
    }

    /// Completes a successful fetch: installs `object` on `core`, clears
    /// `BUSY`, links it into `store`'s LRU and the expiry heap, and wakes
    /// every coalesced waiter.
    pub fn admit_cacheable(&self, head: &Arc<ObjHead>, core: Arc<ObjCore>, object: Object, exp: Exp, store: Arc<Store>) {
        self.busy_objects.remove(&core.id());
        admit(&self.index, head, core, object, Admission::Cache { exp }, store, &self.expiry);
    }

    /// Completes a hit-for-miss/hit-for-pass admission: caches only the
    /// "uncacheable" decision, not a body, for `shortlived` seconds (spec
    /// §4.5, §4.6).
    pub fn admit_uncacheable(&self, head: &Arc<ObjHead>, core: Arc<ObjCore>, now: f64, pass: bool) {
        self.busy_objects.remove(&core.id());
        core.with_flags_mut(|f| f.insert(if pass { ObjFlags::PASS } else { ObjFlags::HFM }));
        core.set_exp(short_lived_exp(now, self.params.shortlived()));
        let object = Object::new(self.xids.next(), HeaderMap::new());
        admit(
            &self.index,
            head,
            core,
            object,
            Admission::Uncacheable,
            Arc::new(Store::default()),
            &self.expiry,
        );
    }

    /// Completes a failed fetch: marks `core` `DYING`, detaches it from
    /// `head`, and wakes coalesced waiters so they retry as a fresh miss.
    pub fn abandon_fetch(&self, head: &Arc<ObjHead>, core: &Arc<ObjCore>) {
        self.busy_objects.remove(&core.id());
        abandon(&self.index, head, core);
    }

    /// Re-arms `core` with a freshly computed `Exp` after a successful
    /// revalidation (spec §4.4, `rearm`), without re-fetching the body.
    pub fn rearm(&self, core: &Arc<ObjCore>, store: Arc<Store>, exp: Exp) {
        core.set_exp(exp);
        self.expiry.rearm(Arc::clone(core), store);
    }

    /// The touch-policy helper (spec §4.4): moves `core` to `store`'s LRU
    /// tail, throttled by `lru_interval`.
    pub fn touch(&self, core: &Arc<ObjCore>, store: &Store, now_ms: i64) -> bool {
        let interval_ms = (self.params.lru_interval() * 1000.0) as i64;
        let moved = self.expiry.touch_if_due(core, store, now_ms, interval_ms);
        if moved {
            self.counters.record_lru_moved();
        }
        moved
    }

    /// Adds a new ban (spec §4.6), returning its sequence number.
    pub fn ban_add(&self, predicates: Vec<BanPredicate>, now: f64) -> u64 {
        self.bans.add(predicates, now, self.params.ban_dups())
    }

    /// Evicts one object from `store` under storage pressure (spec §4.4,
    /// "Nuke-one"): the oldest entry with no other live holder, marked
    /// `DYING` and torn down immediately rather than waiting for the
    /// expiry engine to notice on its own schedule.
    ///
    /// Returns `None` once nothing in `store`'s LRU is evictable (every
    /// remaining entry has a delivery or fetch still holding it) —
    /// callers retrying an allocation should treat a `None` as a bail-out
    /// signal rather than spinning (spec §9, Open Question: nuke_one
    /// under a fully pinned LRU).
    pub fn nuke_one(&self, store: Arc<Store>) -> Option<Arc<ObjCore>> {
        let victim = store.lru.nuke_one_where(|core| core.refcount() == 1)?;
        victim.mark_dying();
        self.expiry.mark_dying(Arc::clone(&victim), store);
        if victim.decref() {
            self.index.reap(&victim);
        }
        self.counters.record_lru_nuked();
        tracing::debug!(oc = victim.id(), "nuked under storage pressure");
        Some(victim)
    }

    /// Process-wide counters aggregator.
    pub fn counters(&self) -> &Arc<GlobalCounters> {
        &self.counters
    }

    /// Registered storage engines, transient store included.
    pub fn engines(&self) -> &[Arc<dyn Stevedore>] {
        &self.engines
    }

    /// The live, runtime-adjustable knob table.
    pub fn params(&self) -> &Arc<Params> {
        &self.params
    }

    /// The time source this context was built with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Allocates the next transaction id.
    pub fn next_xid(&self) -> u64 {
        self.xids.next()
    }
}

/// Adapts the index's raw stale-reference scan into the paginated
/// `CandidateSource` the ban lurker expects: `run()` calls this
/// repeatedly with the *same* `ref_seq` until it returns an empty batch,
/// so a plain re-scan per call would hand back the same oversized batch
/// forever once the candidate count exceeds `ban_lurker_batch`. A cursor
/// keyed on `ref_seq` makes each call consume from where the last left
/// off, resetting once a new ban entry's sequence number arrives.
fn make_candidate_source(index: Arc<ObjIndex>, ban_target_for: BanTargetFor) -> CandidateSource {
    let cursor: Mutex<Option<(u64, VecDeque<Arc<ObjCore>>)>> = Mutex::new(None);
    Box::new(move |ref_seq, batch| {
        let mut cursor = cursor.lock();
        if cursor.as_ref().map(|(seq, _)| *seq) != Some(ref_seq) {
            *cursor = Some((ref_seq, index.cores_with_stale_ban_ref(ref_seq)));
        }
        let (_, queue) = cursor.as_mut().expect("just populated above");
        let mut out = Vec::new();
        for _ in 0..batch {
            let Some(core) = queue.pop_front() else { break };
            if let Some(target) = ban_target_for(&core) {
                out.push(LurkerCandidate { core, target });
            }
        }
        out
    })
}
