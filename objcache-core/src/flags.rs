//! ObjCore flag word.
//!
//! Corresponds to the original `struct objcore.flags` bitmask
//! (`OC_F_BUSY`, `OC_F_PASS`, …), expanded with the `HFM`, `CANCEL` and
//! `DYING` bits spec §3 calls out explicitly.

use bitflags::bitflags;

bitflags! {
    /// Flags on an [`ObjCore`](crate::objcore::ObjCore).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ObjFlags: u32 {
        /// A fetch is currently running and populating this core. While set,
        /// the core is not on any LRU list and not in the expiry heap.
        const BUSY    = 1 << 0;
        /// The response must not be shared between requests (hit-for-pass).
        const PASS    = 1 << 1;
        /// Private to the fetching request; never promoted to a shared hit.
        const PRIVATE = 1 << 2;
        /// Hit-for-miss marker: caches the decision "this was uncacheable",
        /// not a body.
        const HFM      = 1 << 3;
        /// The in-flight fetch has been asked to stop (client disconnect on
        /// an uncacheable response).
        const CANCEL   = 1 << 4;
        /// Monotonic: once set, never cleared. The core is being torn down
        /// and must not be returned from `lookup`.
        const DYING    = 1 << 5;
        /// Removed from its LRU list pending a mailbox hand-off to the
        /// expiry thread (`OC_EF_OFFLRU` in the original).
        const OFFLRU   = 1 << 6;
    }
}

impl Default for ObjFlags {
    fn default() -> Self {
        ObjFlags::empty()
    }
}
