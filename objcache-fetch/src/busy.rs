//! [`BusyObject`]: transient per-fetch state attached to an `ObjHead`
//! while a fetch runs (spec §3 "BusyObject", §4.5 "Streaming visibility").
//!
//! Grounded on the original's `struct busyobj` fields `state`,
//! `doclose`, and the `bo->mtx`/`bo->cond` pair `VBO_extend` broadcasts
//! on — here collapsed to a `parking_lot::Mutex<Inner>` + `Condvar`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use objcache_core::Segment;

/// Lifecycle state of an in-progress fetch (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Backend headers received; body streaming may begin.
    ReqDone,
    /// Body bytes are being pulled through the filter chain.
    Fetch,
    /// The full body was fetched and committed successfully.
    Finished,
    /// The fetch failed; `len` is final and no more bytes will arrive.
    Failed,
}

/// Why the backend connection will be closed once the fetch finishes
/// (mirrors `bo->doclose`'s `enum sess_close` reasons, narrowed to the
/// ones this core's fetch path can itself decide).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoClose {
    /// Keep-alive: the connection may be reused for the next fetch.
    None,
    /// The backend response body was truncated or malformed.
    RxBody,
    /// Storage was exhausted partway through the fetch.
    OutOfStorage,
    /// A filter in the pipeline reported an error.
    FetchFailed,
}

struct Inner {
    state: FetchState,
    len: u64,
    doclose: DoClose,
    /// Segments registered as the fetcher allocates them, in order,
    /// including the one currently being filled. Lets a delivery
    /// coalesced behind this fetch read a segment's committed prefix via
    /// `Segment::as_slice` while the fetcher keeps extending it, instead
    /// of waiting for `finish`.
    segments: Vec<Arc<Segment>>,
}

/// Streaming state a fetch exposes while it runs, so deliveries that
/// coalesced behind it (spec §4.5, "grace hit" while a revalidation is
/// in flight) can read already-committed bytes without waiting for the
/// whole body.
pub struct BusyObject {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl BusyObject {
    /// A freshly installed busy object, before any bytes have arrived.
    pub fn new() -> Self {
        BusyObject {
            inner: Mutex::new(Inner {
                state: FetchState::ReqDone,
                len: 0,
                doclose: DoClose::None,
                segments: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FetchState {
        self.inner.lock().state
    }

    /// Moves to `FETCH` once headers are in and body streaming begins.
    pub fn begin_fetch(&self) {
        self.inner.lock().state = FetchState::Fetch;
    }

    /// Extends the visible body length by `n` bytes and wakes any reader
    /// blocked on more data (`VBO_extend`). `len` only ever grows (spec
    /// §4.5, "ordering guarantees": "a `BusyObject`'s `len` never
    /// decreases").
    pub fn extend(&self, n: u64) {
        let mut inner = self.inner.lock();
        inner.len += n;
        self.cond.notify_all();
    }

    /// Current visible length.
    pub fn len(&self) -> u64 {
        self.inner.lock().len
    }

    /// Registers a segment the fetcher has just allocated (or finalized),
    /// so a streaming delivery can find it via [`segment`](Self::segment)
    /// (spec §4.5, "Streaming visibility"). Called once per segment, at
    /// allocation time — readers observe it fill up through its own
    /// `Segment::commit`/`as_slice`, not through `BusyObject`.
    pub fn push_segment(&self, segment: Arc<Segment>) {
        self.inner.lock().segments.push(segment);
    }

    /// The `idx`-th segment registered so far (finalized or still being
    /// filled), if the fetch has allocated that many yet.
    pub fn segment(&self, idx: usize) -> Option<Arc<Segment>> {
        self.inner.lock().segments.get(idx).cloned()
    }

    /// Marks the fetch as successfully complete and wakes readers.
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        inner.state = FetchState::Finished;
        self.cond.notify_all();
    }

    /// Marks the fetch as failed with `reason`, final `len` unchanged,
    /// and wakes readers so they observe `FAILED` instead of blocking
    /// forever.
    pub fn fail(&self, reason: DoClose) {
        let mut inner = self.inner.lock();
        inner.state = FetchState::Failed;
        inner.doclose = reason;
        self.cond.notify_all();
    }

    /// Why the connection will close once the fetch is done.
    pub fn doclose(&self) -> DoClose {
        self.inner.lock().doclose
    }

    /// Blocks a streaming delivery until more bytes than `have_read` are
    /// visible, or the fetch reaches a terminal state (spec §4.5, "a
    /// delivery ... condwaits on the BusyObject mutex for more data").
    /// Returns the new visible length, or `None` if the fetch failed
    /// with nothing left to read past `have_read`.
    pub fn wait_for_more(&self, have_read: u64) -> Option<u64> {
        let mut inner = self.inner.lock();
        loop {
            if inner.len > have_read {
                return Some(inner.len);
            }
            match inner.state {
                FetchState::Finished => return Some(inner.len),
                FetchState::Failed => return None,
                FetchState::ReqDone | FetchState::Fetch => {}
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Blocks until the fetch reaches a terminal state, regardless of how
    /// many bytes have been read so far. Returns `true` if it finished
    /// successfully, `false` if it failed — for a caller that only cares
    /// whether it is safe to stop waiting and read the installed `Object`
    /// (spec §4.5: a delivery coalesced behind a busy fetch has nothing
    /// to iterate until the fetch either commits a body or fails).
    pub fn wait_until_terminal(&self) -> bool {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                FetchState::Finished => return true,
                FetchState::Failed => return false,
                FetchState::ReqDone | FetchState::Fetch => {}
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Same as [`Self::wait_for_more`] but bounded, for callers that
    /// must eventually give up on a wedged fetch.
    pub fn wait_for_more_timeout(&self, have_read: u64, timeout: Duration) -> Option<u64> {
        let mut inner = self.inner.lock();
        loop {
            if inner.len > have_read {
                return Some(inner.len);
            }
            match inner.state {
                FetchState::Finished => return Some(inner.len),
                FetchState::Failed => return None,
                FetchState::ReqDone | FetchState::Fetch => {}
            }
            let result = self.cond.wait_for(&mut inner, timeout);
            if result.timed_out() && inner.len <= have_read && inner.state != FetchState::Finished {
                return Some(inner.len);
            }
        }
    }
}

impl Default for BusyObject {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn extend_wakes_a_waiting_reader() {
        let bo = Arc::new(BusyObject::new());
        bo.begin_fetch();

        let reader = {
            let bo = Arc::clone(&bo);
            thread::spawn(move || bo.wait_for_more(0))
        };

        thread::sleep(Duration::from_millis(20));
        bo.extend(5);
        assert_eq!(reader.join().unwrap(), Some(5));
    }

    #[test]
    fn failed_state_releases_a_waiting_reader_with_none() {
        let bo = Arc::new(BusyObject::new());
        bo.begin_fetch();

        let reader = {
            let bo = Arc::clone(&bo);
            thread::spawn(move || bo.wait_for_more(0))
        };

        thread::sleep(Duration::from_millis(20));
        bo.fail(DoClose::FetchFailed);
        assert_eq!(reader.join().unwrap(), None);
    }

    #[test]
    fn finish_with_no_new_bytes_returns_current_len() {
        let bo = BusyObject::new();
        bo.begin_fetch();
        bo.extend(3);
        bo.finish();
        assert_eq!(bo.wait_for_more(3), Some(3));
    }

    #[test]
    fn wait_until_terminal_reports_success_and_failure() {
        let bo = BusyObject::new();
        bo.finish();
        assert!(bo.wait_until_terminal());

        let bo = BusyObject::new();
        bo.fail(DoClose::FetchFailed);
        assert!(!bo.wait_until_terminal());
    }

    #[test]
    fn len_is_monotonic_across_extends() {
        let bo = BusyObject::new();
        bo.extend(4);
        bo.extend(6);
        assert_eq!(bo.len(), 10);
    }
}
