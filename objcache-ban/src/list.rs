//! The ban list itself (spec §4.6): newest→oldest, append-only, with
//! lazy per-lookup evaluation and duplicate-supersession GC.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use objcache_core::ObjCore;
use parking_lot::Mutex;

use crate::predicate::{BanPredicate, BanTarget};

/// One inserted ban: a sequence number (monotonic, doubles as the list's
/// notion of "position") plus the conjunction of predicates that must all
/// match for the ban to apply.
pub struct BanEntry {
    seq: u64,
    created_at: f64,
    predicates: Vec<BanPredicate>,
    /// Set when a later identical ban supersedes this one (`ban_dups`),
    /// making it eligible for GC regardless of what still references it.
    completed: AtomicBool,
}

impl BanEntry {
    /// This ban's sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When this ban was inserted (seconds since the Unix epoch).
    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Whether every predicate in this ban matches `target`.
    pub fn matches(&self, target: &dyn BanTarget) -> bool {
        self.predicates.iter().all(|p| p.matches(target))
    }

    fn same_predicates(&self, other: &[BanPredicate]) -> bool {
        self.predicates.len() == other.len()
            && self
                .predicates
                .iter()
                .zip(other)
                .all(|(a, b)| format!("{a:?}") == format!("{b:?}"))
    }
}

/// Result of evaluating an `ObjCore` against the bans newer than its
/// reference-ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanOutcome {
    /// A ban matched; the caller should mark the core `DYING`.
    Matched,
    /// No ban matched. The core's reference-ban pointer should advance to
    /// the returned sequence number (the list head at evaluation time).
    Clean(u64),
}

/// The ordered ban list.
#[derive(Default)]
pub struct BanList {
    /// Front = newest, back = oldest.
    entries: Mutex<VecDeque<Arc<BanEntry>>>,
    next_seq: AtomicU64,
}

impl BanList {
    /// An empty ban list.
    pub fn new() -> Self {
        BanList::default()
    }

    /// The current head sequence number — the value a newly inserted
    /// `ObjCore` should record as its reference-ban.
    pub fn head_seq(&self) -> u64 {
        self.entries
            .lock()
            .front()
            .map(|e| e.seq)
            .unwrap_or(0)
    }

    /// Number of live (non-GC'd) bans.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the list holds no bans.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a new ban at the head. If `ban_dups` is set, any existing
    /// non-completed ban with an identical predicate set is marked
    /// completed (spec §4.6: "Duplication").
    pub fn add(&self, predicates: Vec<BanPredicate>, now: f64, ban_dups: bool) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let entry = Arc::new(BanEntry {
            seq,
            created_at: now,
            predicates,
            completed: AtomicBool::new(false),
        });

        let mut entries = self.entries.lock();
        if ban_dups {
            for existing in entries.iter() {
                if !existing.completed.load(Ordering::Acquire) && existing.same_predicates(&entry.predicates) {
                    existing.completed.store(true, Ordering::Release);
                }
            }
        }
        entries.push_front(Arc::clone(&entry));
        tracing::debug!(seq, "ban added");
        seq
    }

    /// Evaluates `target` against every ban newer than `ref_seq`, newest
    /// first, short-circuiting on the first match.
    pub fn evaluate(&self, ref_seq: u64, target: &dyn BanTarget) -> BanOutcome {
        let entries = self.entries.lock();
        let head_seq = entries.front().map(|e| e.seq).unwrap_or(ref_seq);
        for entry in entries.iter() {
            if entry.seq <= ref_seq {
                break;
            }
            if entry.matches(target) {
                return BanOutcome::Matched;
            }
        }
        BanOutcome::Clean(head_seq)
    }

    /// Evaluates `core` against bans newer than its current reference-ban
    /// pointer, marking it `DYING` on a match or else advancing the
    /// pointer to the current head (spec §4.6 lazy evaluation).
    pub fn check(&self, core: &Arc<ObjCore>, target: &dyn BanTarget) -> bool {
        match self.evaluate(core.ban_seq(), target) {
            BanOutcome::Matched => {
                core.mark_dying();
                true
            }
            BanOutcome::Clean(head) => {
                core.set_ban_seq(head);
                false
            }
        }
    }

    /// Removes bans from the tail while they are either completed
    /// (superseded) or older than `min_live_seq` — the minimum
    /// reference-ban sequence across every still-live `ObjCore`, supplied
    /// by the caller, which is the only place that knows the full set of
    /// live cores. Returns how many were removed.
    pub fn gc(&self, min_live_seq: u64) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        while let Some(back) = entries.back() {
            let reapable = back.completed.load(Ordering::Acquire) || back.seq < min_live_seq;
            if !reapable {
                break;
            }
            entries.pop_back();
            removed += 1;
        }
        removed
    }

    /// Bans older than `age` seconds as of `now`, oldest first — the
    /// lurker's work unit (spec §4.6: "ban_lurker_age").
    pub fn aged_bans(&self, now: f64, age: f64) -> Vec<Arc<BanEntry>> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| now - e.created_at >= age)
            .cloned()
            .collect()
    }
}
