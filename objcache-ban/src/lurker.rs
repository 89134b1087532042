//! The ban lurker (spec §4.6): a background thread that periodically
//! sweeps aged bans and re-evaluates objects that still reference an
//! older ban, so eviction isn't gated entirely on lookup traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use objcache_core::ObjCore;
use parking_lot::Mutex;

use crate::list::BanList;
use crate::predicate::BanTarget;

/// One object the lurker should re-check: the core plus enough metadata
/// to evaluate predicates against it. Supplied by whichever crate owns
/// the live object set (the index), since this crate has no registry of
/// its own.
pub struct LurkerCandidate {
    /// The core to re-evaluate.
    pub core: Arc<ObjCore>,
    /// Its request/response metadata.
    pub target: Box<dyn BanTarget + Send>,
}

/// Supplies the lurker with batches of objects whose reference-ban is
/// older than the entry currently being swept. Called with the entry's
/// sequence number and a batch size; returns up to that many candidates,
/// or an empty `Vec` once exhausted for this sweep.
pub type CandidateSource = Box<dyn Fn(u64, usize) -> Vec<LurkerCandidate> + Send + Sync>;

/// Runtime-adjustable lurker knobs (spec §6 table).
#[derive(Debug, Clone, Copy)]
pub struct LurkerConfig {
    /// Bans younger than this are left alone.
    pub ban_lurker_age: f64,
    /// Pause between batches, to avoid starving lookup traffic of lock time.
    pub ban_lurker_sleep: Duration,
    /// Objects visited per batch.
    pub ban_lurker_batch: usize,
}

impl Default for LurkerConfig {
    fn default() -> Self {
        LurkerConfig {
            ban_lurker_age: 60.0,
            ban_lurker_sleep: Duration::from_millis(10),
            ban_lurker_batch: 1000,
        }
    }
}

/// The background lurker thread handle.
pub struct BanLurker {
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BanLurker {
    /// Starts the lurker against `list`, pulling candidates from `source`
    /// and reaping bans below `min_live_seq_fn`'s current value after
    /// each full sweep. `now_fn` supplies the lurker's notion of current
    /// time (a `Clock`, in practice), kept generic here to avoid a
    /// dependency on the expiry crate for one trait.
    pub fn start(
        list: Arc<BanList>,
        source: CandidateSource,
        config: LurkerConfig,
        now_fn: impl Fn() -> f64 + Send + Sync + 'static,
        min_live_seq_fn: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Arc<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("objcache-ban-lurker".into())
            .spawn(move || run(list, source, config, now_fn, min_live_seq_fn, worker_stop))
            .expect("failed to spawn ban lurker thread");

        Arc::new(BanLurker {
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Signals the lurker to stop after its current batch and waits for
    /// it to exit.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BanLurker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    list: Arc<BanList>,
    source: CandidateSource,
    config: LurkerConfig,
    now_fn: impl Fn() -> f64,
    min_live_seq_fn: impl Fn() -> u64,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        let now = now_fn();
        let aged = list.aged_bans(now, config.ban_lurker_age);
        for entry in &aged {
            if stop.load(Ordering::Acquire) {
                return;
            }
            loop {
                let batch = source(entry.seq(), config.ban_lurker_batch);
                if batch.is_empty() {
                    break;
                }
                for candidate in &batch {
                    list.check(&candidate.core, candidate.target.as_ref());
                }
                std::thread::sleep(config.ban_lurker_sleep);
                if batch.len() < config.ban_lurker_batch {
                    break;
                }
            }
        }
        list.gc(min_live_seq_fn());
        std::thread::sleep(config.ban_lurker_sleep.max(Duration::from_millis(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{BanField, BanOp, BanPredicate};
    use objcache_core::ObjFlags;

    struct Fixture(&'static str);
    impl BanTarget for Fixture {
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

    fn core(id: u64) -> Arc<ObjCore> {
        let oc = ObjCore::new_busy(id);
        oc.with_flags_mut(|f| f.remove(ObjFlags::BUSY));
        oc
    }

    #[test]
    fn lurker_marks_stale_referencing_object_dying_then_stops_revisiting() {
        let list = Arc::new(BanList::new());
        let c = core(1);
        c.set_ban_seq(list.head_seq());
        list.add(
            vec![BanPredicate::literal(BanField::ReqUrl, BanOp::Eq, "/a")],
            0.0,
            false,
        );

        let delivered = Arc::new(Mutex::new(false));
        let delivered_clone = Arc::clone(&delivered);
        let core_clone = Arc::clone(&c);
        let source: CandidateSource = Box::new(move |_seq, _batch| {
            let mut done = delivered_clone.lock();
            if *done {
                return Vec::new();
            }
            *done = true;
            vec![LurkerCandidate {
                core: Arc::clone(&core_clone),
                target: Box::new(Fixture("/a")),
            }]
        });

        let lurker = BanLurker::start(
            Arc::clone(&list),
            source,
            LurkerConfig {
                ban_lurker_age: 0.0,
                ban_lurker_sleep: Duration::from_millis(1),
                ban_lurker_batch: 10,
            },
            || 1000.0,
            || 0,
        );

        std::thread::sleep(Duration::from_millis(50));
        lurker.shutdown();

        assert!(c.is_dying());
    }
}
