//! Error kinds shared across the caching core.
//!
//! Mirrors spec §7: every failure mode the core can produce is one of these
//! variants. `Fatal` does not unwind on its own — it is returned like any
//! other error, and it is the caller's decision (the worker pool, not this
//! crate) whether a `Fatal` should abort the process after dumping state.

use thiserror::Error;

/// Errors produced by the caching core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A storage engine could not satisfy an allocation, even after the
    /// configured `nuke_limit` evictions were attempted.
    #[error("out of storage space in engine {engine}")]
    OutOfStorage {
        /// Name of the storage engine that refused the allocation.
        engine: String,
    },

    /// A request-scoped workspace arena was exhausted.
    #[error("workspace overflow: requested {requested} bytes, {available} available")]
    WorkspaceOverflow {
        /// Bytes requested by the failing `alloc`/`reserve` call.
        requested: usize,
        /// Bytes left in the arena at the time of the failing call.
        available: usize,
    },

    /// The fetch pipeline failed. The first failing filter wins; later
    /// layers are not re-entered.
    #[error("fetch failed: {0}")]
    FetchError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stage-specific timeout (connect, first-byte, between-bytes, or a
    /// waiting-list park) elapsed.
    #[error("timeout during {stage}")]
    Timeout {
        /// Which stage timed out.
        stage: &'static str,
    },

    /// The origin response failed header parsing, framing, or a size limit.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// A ban matched during lookup; the object was marked `DYING` and the
    /// lookup should be retried as a miss. Carried as an error variant for
    /// uniform propagation, but callers normally treat it as invisible
    /// per spec §7 ("BanMatched is invisible to the caller").
    #[error("ban matched candidate object")]
    BanMatched,

    /// Internal: the request was parked on a waiting list. Never escapes
    /// `lookup`; present so internal plumbing can use `Result` uniformly.
    #[error("request parked on waiting list")]
    Parked,

    /// An invariant described in spec §8 was violated. Process-level
    /// handling (panic with a diagnostic dump) is the caller's
    /// responsibility; this crate never panics on its own.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

/// Convenience alias for results produced by this crate and its siblings.
pub type CoreResult<T> = Result<T, CoreError>;
