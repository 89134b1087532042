//! What `lookup` needs from the in-flight request, kept as a narrow
//! trait so this crate doesn't depend on whatever HTTP types the policy
//! layer and transport use.

/// Per-request facts the index needs to resolve a candidate.
pub trait LookupRequest {
    /// Looks up a request header by name, for Vary matching. Case folding
    /// is the caller's responsibility (the same convention
    /// `VaryKey::matches` already documents).
    fn vary_lookup(&self, header: &str) -> Option<&str>;

    /// Whether this request can make a conditional (revalidating) fetch,
    /// i.e. is eligible for a hit-for-revalidate within the `keep`
    /// window (spec §4.3 step 3).
    fn can_revalidate(&self) -> bool;
}

/// Admission hints passed alongside a digest (spec §4.3: `hash_ignore_busy`,
/// `hash_always_miss`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupHints {
    /// Don't treat an in-progress busy fetch as a coalescing candidate;
    /// act as if it weren't there.
    pub ignore_busy: bool,
    /// Even if a busy fetch was seen and would normally park this
    /// request, fall through to a fresh Miss instead.
    pub always_miss: bool,
}
