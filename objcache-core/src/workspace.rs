//! Per-request bump-pointer workspace allocator (spec §4.1).
//!
//! A [`Workspace`] is a fixed-size arena carved out once per request. It is
//! never shared across requests and never locked: it is only ever touched
//! by the single worker thread driving that request.

/// Which of the four named workspaces this arena backs.
///
/// Sizes for each kind are configuration values (see `objcache::config`);
/// the kind itself is only used for diagnostics (panic reports, tracing
/// spans) so a `Fatal` dump can say which arena overflowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkspaceKind {
    /// Lives for the whole session (multiple requests on a keep-alive
    /// connection).
    Session,
    /// Lives for one client-facing request.
    ClientRequest,
    /// Lives for one backend (origin) request.
    BackendRequest,
    /// Scratch space private to one worker thread, reused across requests.
    ThreadAux,
}

/// A snapshot of a [`Workspace`]'s bump pointer, for `reset`.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot(usize);

/// An outstanding reservation: scratch space staked out by [`Workspace::reserve`]
/// and not yet finalized by [`Workspace::release`] or cancelled by
/// [`Workspace::cancel`].
///
/// At most one reservation is outstanding per workspace; holding a second
/// `Reservation` alive while this one is live is a caller bug, not
/// something the type prevents (the original doesn't either — it is a
/// documented single-threaded invariant, not a lock).
pub struct Reservation {
    start: usize,
    cap: usize,
}

impl Reservation {
    /// The full capacity of the reservation (`n` passed to `reserve`).
    pub fn capacity(&self) -> usize {
        self.cap
    }
}

/// A bump-pointer arena with a scoped reservation API.
///
/// Layout: `[start .. free) = allocated, [free .. end) = available`. A
/// reservation temporarily moves the conceptual "allocated" boundary to
/// `free + n` so callers can write into `[free, free + n)` before deciding
/// how much of it to keep.
pub struct Workspace {
    kind: WorkspaceKind,
    buf: Box<[u8]>,
    free: usize,
    /// Set once any `alloc`/`reserve` call has failed. Sticky: callers must
    /// check this before trusting writes made after the failing call, per
    /// spec §4.1 ("callers must check `overflow` before relying on any
    /// writes").
    overflow: bool,
    reserved: bool,
}

impl Workspace {
    /// Creates a new workspace of `size` bytes.
    pub fn new(kind: WorkspaceKind, size: usize) -> Self {
        Workspace {
            kind,
            buf: vec![0u8; size].into_boxed_slice(),
            free: 0,
            overflow: false,
            reserved: false,
        }
    }

    /// Which named workspace this is.
    pub fn kind(&self) -> WorkspaceKind {
        self.kind
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.free
    }

    /// Bytes left before the arena is exhausted.
    pub fn available(&self) -> usize {
        self.buf.len() - self.free
    }

    /// Whether any allocation in this workspace's lifetime has overflowed.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Bumps `free` by `n` bytes (8-byte aligned) and returns a mutable
    /// slice into the arena, or `None` on overflow (the overflow flag is
    /// set either way).
    pub fn alloc(&mut self, n: usize) -> Option<&mut [u8]> {
        assert!(!self.reserved, "alloc while a reservation is outstanding");
        let aligned = align_up(n);
        if self.free + aligned > self.buf.len() {
            self.overflow = true;
            return None;
        }
        let start = self.free;
        self.free += aligned;
        Some(&mut self.buf[start..start + n])
    }

    /// Stakes out `n` bytes of scratch space without committing it. The
    /// caller may write into the returned slice and later call
    /// [`release`](Self::release) with however many bytes it actually used,
    /// or [`cancel`](Self::cancel) to give the space back entirely.
    pub fn reserve(&mut self, n: usize) -> Option<(Reservation, &mut [u8])> {
        assert!(!self.reserved, "at most one reservation at a time");
        let aligned = align_up(n);
        if self.free + aligned > self.buf.len() {
            self.overflow = true;
            return None;
        }
        let start = self.free;
        self.reserved = true;
        Some((Reservation { start, cap: n }, &mut self.buf[start..start + n]))
    }

    /// Commits `used <= reservation.capacity()` bytes of a prior
    /// [`reserve`](Self::reserve) call, shortening it if `used` is less
    /// than the original request.
    pub fn release(&mut self, reservation: Reservation, used: usize) {
        assert!(self.reserved, "release without an outstanding reservation");
        assert!(used <= reservation.cap, "release(used > reserved)");
        self.free = reservation.start + align_up(used);
        self.reserved = false;
    }

    /// Cancels a reservation, returning the arena to its state before
    /// `reserve` was called.
    pub fn cancel(&mut self, reservation: Reservation) {
        assert!(self.reserved, "cancel without an outstanding reservation");
        self.free = reservation.start;
        self.reserved = false;
    }

    /// Records the current bump pointer for a later [`reset`](Self::reset).
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.free)
    }

    /// Rolls the bump pointer back to a prior [`snapshot`](Self::snapshot).
    /// Does not clear `overflow` — a workspace that has overflowed once
    /// stays flagged for its remaining lifetime.
    pub fn reset(&mut self, snap: Snapshot) {
        assert!(!self.reserved, "reset while a reservation is outstanding");
        assert!(snap.0 <= self.free, "reset to a snapshot taken after free");
        self.free = snap.0;
    }
}

fn align_up(n: usize) -> usize {
    (n + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_bumps_free_and_aligns() {
        let mut ws = Workspace::new(WorkspaceKind::ClientRequest, 64);
        ws.alloc(3).unwrap();
        assert_eq!(ws.used(), 8);
    }

    #[test]
    fn alloc_past_capacity_sets_overflow() {
        let mut ws = Workspace::new(WorkspaceKind::ClientRequest, 16);
        assert!(ws.alloc(32).is_none());
        assert!(ws.overflowed());
    }

    #[test]
    fn reserve_then_release_shorter_rewinds_partially() {
        let mut ws = Workspace::new(WorkspaceKind::ThreadAux, 64);
        let (res, buf) = ws.reserve(32).unwrap();
        buf[0] = 1;
        ws.release(res, 8);
        assert_eq!(ws.used(), 8);
    }

    #[test]
    fn reserve_then_cancel_rewinds_fully() {
        let mut ws = Workspace::new(WorkspaceKind::ThreadAux, 64);
        let snap = ws.snapshot();
        let (res, _buf) = ws.reserve(32).unwrap();
        ws.cancel(res);
        assert_eq!(ws.used(), snap.0);
    }

    #[test]
    fn snapshot_reset_rolls_back_prior_allocations() {
        let mut ws = Workspace::new(WorkspaceKind::Session, 64);
        let snap = ws.snapshot();
        ws.alloc(16).unwrap();
        ws.reset(snap);
        assert_eq!(ws.used(), 0);
    }
}
