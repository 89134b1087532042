//! `deliver_begin`/`deliver_iter`/`deliver_end` (spec §6): streams an
//! already-admitted or still-fetching [`ObjCore`]'s body out as a
//! sequence of borrowed chunks, one per storage segment, without copying.
//!
//! A delivery that coalesced behind a still-running fetch (spec §4.5,
//! grace hit on a busy head) reads the same segments the fetcher is
//! committing into, through the registered [`BusyObject`]: each call to
//! [`Core::deliver_iter`] returns whatever prefix of the current segment
//! is committed so far, blocking on the `BusyObject` only when it has
//! caught up to everything committed and the fetch hasn't reached a
//! terminal state. Once the fetch finishes, delivery transparently
//! switches to reading the finished [`Object`] installed on the core.

use std::sync::Arc;

use objcache_core::{Object, ObjCore, Segment};
use objcache_fetch::BusyObject;

/// Iterator state for one in-progress delivery (spec §6, "iterator").
///
/// Cheap to construct; holds a strong ref to the `ObjCore` it reads from
/// (callers must already hold one from `lookup`'s `Hit`), and, lazily,
/// either the `Arc<Object>` it is walking (once the fetch — if any — has
/// finished) or the `Arc<BusyObject>` it is streaming from (while one is
/// still running).
pub struct DeliverIter {
    core: Arc<ObjCore>,
    object: Option<Arc<Object>>,
    busy: Option<Arc<BusyObject>>,
    /// The segment `seg_idx` currently points at, kept alive here so a
    /// returned chunk can borrow from it across the call.
    current: Option<Arc<Segment>>,
    seg_idx: usize,
    seg_off: usize,
    /// Bytes handed to the caller so far, the `have_read` cursor for
    /// `BusyObject::wait_for_more`.
    have_read: u64,
}

/// One step of a delivery (spec §6: `deliver_iter(iterator) -> (ptr, len,
/// {data, stream, done, error})`).
///
/// `Data` borrows directly from the underlying segment — no copy, no
/// allocation — for as long as the `DeliverIter` that produced it is
/// alive.
#[derive(Debug)]
pub enum DeliverChunk<'a> {
    /// A committed, readable byte range.
    Data(&'a [u8]),
    /// The body has been fully delivered.
    Done,
    /// Nothing more can be delivered: the fetch failed before committing
    /// a body visible to this delivery, or the core has no object and
    /// no fetch is running for it.
    Error,
}

impl DeliverIter {
    /// The `ObjCore` this iterator reads from.
    pub fn core(&self) -> &Arc<ObjCore> {
        &self.core
    }
}

impl super::core::Core {
    /// Begins a delivery against `core` (spec §6, `deliver_begin`).
    ///
    /// `core` must already be referenced by the caller (typically the
    /// `Arc<ObjCore>` returned from a `Hit` or grace/HFR lookup outcome);
    /// this call does not itself take a reference.
    pub fn deliver_begin(&self, core: Arc<ObjCore>) -> DeliverIter {
        DeliverIter {
            core,
            object: None,
            busy: None,
            current: None,
            seg_idx: 0,
            seg_off: 0,
            have_read: 0,
        }
    }

    /// Advances `it` by one chunk (spec §6, `deliver_iter`).
    ///
    /// A core whose fetch hasn't finished streams the body out of the
    /// fetch's [`BusyObject`](objcache_fetch::BusyObject) as segments
    /// commit, rather than blocking until the whole fetch terminates
    /// (spec §4.5, "Streaming visibility"): this only blocks once it has
    /// caught up to the last byte currently committed, and only until
    /// either more bytes land or the fetch reaches a terminal state.
    pub fn deliver_iter<'a>(&self, it: &'a mut DeliverIter) -> DeliverChunk<'a> {
        loop {
            // Drain whatever is already committed in the segment we're
            // positioned on.
            if let Some(seg) = it.current.as_ref() {
                let committed = seg.as_slice().len();
                if it.seg_off < committed {
                    let start = it.seg_off;
                    it.seg_off = committed;
                    it.have_read += (committed - start) as u64;
                    let seg = it.current.as_ref().expect("checked above");
                    return DeliverChunk::Data(&seg.as_slice()[start..]);
                }

                // Caught up to this segment's committed prefix. It is
                // sealed — guaranteed no more bytes — once either the
                // finished `Object` has it, or the fetcher has already
                // moved on to allocating the next segment (it only does
                // that once this one is full or the body ended, spec
                // §4.5 "Pipeline"). Otherwise it's still the fetcher's
                // live tail and we must wait rather than re-deriving it
                // from `busy` (which would hand back this same,
                // still-exhausted segment and spin).
                let sealed = match &it.object {
                    Some(obj) => it.seg_idx < obj.segments().len(),
                    None => it
                        .busy
                        .as_ref()
                        .is_some_and(|busy| busy.segment(it.seg_idx + 1).is_some()),
                };
                if sealed {
                    it.current = None;
                    it.seg_idx += 1;
                    it.seg_off = 0;
                    continue;
                }
                if it.object.is_some() {
                    return DeliverChunk::Done;
                }

                let busy = it.busy.clone().expect("streaming without a registered BusyObject");
                match busy.wait_for_more(it.have_read) {
                    Some(new_len) if new_len > it.have_read => continue,
                    Some(_) => {
                        // The fetch reached a terminal state with
                        // nothing new past what we've read. The fetcher
                        // calls `finish()` and then installs `Object` on
                        // the core in that order but not atomically;
                        // spin briefly for the install to land rather
                        // than reporting a spurious error on the race.
                        match (0..1024).find_map(|_| it.core.object()) {
                            Some(obj) => {
                                it.object = Some(obj);
                                it.busy = None;
                                continue;
                            }
                            None => return DeliverChunk::Done,
                        }
                    }
                    None => return DeliverChunk::Error,
                }
            }

            // No segment to read from yet: find the object or fetch this
            // delivery should read `seg_idx` from.
            if it.object.is_none() {
                match it.core.object() {
                    Some(obj) => {
                        it.object = Some(obj);
                        it.busy = None;
                    }
                    None if it.busy.is_none() => match self.busy_object(&it.core) {
                        Some(busy) => it.busy = Some(busy),
                        None => return DeliverChunk::Error,
                    },
                    None => {}
                }
            }

            if let Some(obj) = it.object.clone() {
                match obj.segments().get(it.seg_idx) {
                    Some(seg) => {
                        it.current = Some(Arc::clone(seg));
                        continue;
                    }
                    None => return DeliverChunk::Done,
                }
            }

            let busy = it.busy.clone().expect("populated above");
            match busy.segment(it.seg_idx) {
                Some(seg) => {
                    it.current = Some(seg);
                    continue;
                }
                None => match busy.wait_for_more(it.have_read) {
                    Some(new_len) if new_len > it.have_read => continue,
                    Some(_) => match (0..1024).find_map(|_| it.core.object()) {
                        Some(obj) => {
                            it.object = Some(obj);
                            it.busy = None;
                            continue;
                        }
                        None => return DeliverChunk::Done,
                    },
                    None => return DeliverChunk::Error,
                },
            }
        }
    }

    /// Ends a delivery (spec §6, `deliver_end`). Dropping `it` has the
    /// same effect; this exists so callers can mirror the symmetric
    /// `begin`/`iter`/`end` triple explicitly.
    pub fn deliver_end(&self, it: DeliverIter) {
        drop(it);
    }
}
