//! The 33-bucket, page-granular free list one mmap'd region maintains
//! (spec §4.2: "carved into `page_size`-aligned segments tracked by a
//! sorted linked list and 33 free buckets indexed by `size / page_size`
//! capped at 32 (\"or larger\")").

use std::collections::BTreeMap;

/// Number of buckets: exact page counts `1..=32`, plus bucket 32 catching
/// "32 pages or larger".
pub const BUCKETS: usize = 33;

/// Smallest initial mapping we'll accept during recursive halving
/// (spec §4.2: "bisect until a minimum (≥ `MIN_PAGES`) succeeds").
pub const MIN_PAGES: usize = 16;

fn bucket_of(pages: usize) -> usize {
    pages.saturating_sub(1).min(BUCKETS - 1)
}

/// Free-space tracker for one contiguous mmap region, in page units.
///
/// `free` is the canonical source of truth (offset → length, sorted by
/// offset so coalescing a freed run only has to look at its immediate
/// neighbors); `buckets` indexes the same offsets by size bucket so
/// `take` doesn't have to scan every free run to find one of adequate
/// size.
pub struct RegionFreeList {
    free: BTreeMap<usize, usize>,
    buckets: [Vec<usize>; BUCKETS],
    total_pages: usize,
}

impl RegionFreeList {
    /// A fresh free list covering `[0, total_pages)`, entirely free.
    pub fn new(total_pages: usize) -> Self {
        let mut list = RegionFreeList {
            free: BTreeMap::new(),
            buckets: std::array::from_fn(|_| Vec::new()),
            total_pages,
        };
        if total_pages > 0 {
            list.insert_free(0, total_pages);
        }
        list
    }

    /// Total pages this region covers (free or allocated).
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Sum of all free run lengths, for gauges.
    pub fn free_pages(&self) -> usize {
        self.free.values().sum()
    }

    /// Number of distinct free runs, for the `g_smf` gauge.
    pub fn run_count(&self) -> usize {
        self.free.len()
    }

    /// Free runs shorter than a page-aligned "whole page" worth of
    /// fragmentation bucket (bucket 0, i.e. exactly 1 page) — used for
    /// the `g_smf_frag` gauge.
    pub fn fragmented_count(&self) -> usize {
        self.buckets[0].len()
    }

    /// Free runs in the "32 or larger" bucket, for `g_smf_large`.
    pub fn large_count(&self) -> usize {
        self.buckets[BUCKETS - 1].len()
    }

    fn remove_from_bucket(&mut self, offset: usize, len: usize) {
        let b = bucket_of(len);
        if let Some(pos) = self.buckets[b].iter().position(|&o| o == offset) {
            self.buckets[b].swap_remove(pos);
        }
    }

    /// Returns `offset`/`len` of a free run to its bucket and the
    /// canonical map, coalescing with adjacent free neighbors first
    /// (spec §4.2: "`free(seg)` coalesces with neighbors that are
    /// adjacent in file-offset order and currently free").
    pub fn insert_free(&mut self, mut offset: usize, mut len: usize) {
        if let Some((&prev_off, &prev_len)) = self.free.range(..offset).next_back()
            && prev_off + prev_len == offset
        {
            self.remove_from_bucket(prev_off, prev_len);
            self.free.remove(&prev_off);
            offset = prev_off;
            len += prev_len;
        }
        if let Some((&next_off, &next_len)) = self.free.range(offset + len..).next()
            && next_off == offset + len
        {
            self.remove_from_bucket(next_off, next_len);
            self.free.remove(&next_off);
            len += next_len;
        }
        self.free.insert(offset, len);
        self.buckets[bucket_of(len)].push(offset);
    }

    /// Takes the first free run of at least `pages_needed` pages,
    /// splitting off and re-bucketing the remainder if the run found was
    /// larger than requested (spec §4.2: "`alloc(n)` ... if the run is
    /// larger, a prefix of exactly the requested size is split off and
    /// the remainder re-bucketed"). Returns the page offset of the
    /// allocated prefix.
    pub fn take(&mut self, pages_needed: usize) -> Option<usize> {
        let start = bucket_of(pages_needed);
        for b in start..BUCKETS {
            for i in 0..self.buckets[b].len() {
                let offset = self.buckets[b][i];
                let len = *self.free.get(&offset).expect("bucket/free map desync");
                if len < pages_needed {
                    continue;
                }
                self.buckets[b].swap_remove(i);
                self.free.remove(&offset);
                if len > pages_needed {
                    self.insert_free(offset + pages_needed, len - pages_needed);
                }
                return Some(offset);
            }
        }
        None
    }
}
