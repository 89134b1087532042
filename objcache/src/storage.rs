//! Storage engine registration (spec §4.2, §6: "A configuration token like
//! `file,/path,SIZE[,granularity]` or `malloc[,SIZE]` instantiates one
//! engine").
//!
//! [`StevedoreSpec`] is a typed stand-in for that configuration grammar —
//! we don't parse the literal token (config-file loading is out of scope),
//! but the enum carries the same information a caller would otherwise
//! write as a string.

use std::path::PathBuf;
use std::sync::Arc;

use objcache_backend::{Stevedore, TRANSIENT_IDENT};
use objcache_core::CoreResult;
use objcache_storage_file::FileEngine;
use objcache_storage_malloc::MallocEngine;
use objcache_storage_transient::TransientEngine;

/// Default page size for a file-backed engine when the caller doesn't
/// name one (spec §6 calls this "granularity").
pub const DEFAULT_GRANULARITY: usize = 4096;

/// A storage engine to instantiate, the typed equivalent of one
/// `storage` token.
#[derive(Debug, Clone)]
pub enum StevedoreSpec {
    /// A file-backed (mmap) engine of `size` bytes at `path`, carved into
    /// `granularity`-byte pages.
    File {
        /// Backing file path; created if missing.
        path: PathBuf,
        /// Total bytes to reserve.
        size: usize,
        /// Page size in bytes, defaulting to [`DEFAULT_GRANULARITY`].
        granularity: Option<usize>,
    },
    /// A heap-backed engine, optionally capped at `size` total bytes.
    Malloc {
        /// Byte budget, or `None` for unbounded.
        size: Option<usize>,
    },
    /// The well-known transient store (spec §6: ident `"Transient"`),
    /// used automatically for objects below the `shortlived` threshold.
    Transient,
}

/// Instantiates the engine described by `spec`.
///
/// The returned handle has already had [`Stevedore::open`] called on it.
pub fn open(spec: StevedoreSpec) -> CoreResult<Arc<dyn Stevedore>> {
    let engine: Arc<dyn Stevedore> = match spec {
        StevedoreSpec::File { path, size, granularity } => {
            FileEngine::open(path, size, granularity.unwrap_or(DEFAULT_GRANULARITY))?
        }
        StevedoreSpec::Malloc { size } => MallocEngine::new("malloc", size),
        StevedoreSpec::Transient => TransientEngine::new(),
    };
    engine.open()?;
    Ok(engine)
}

/// Whether `engine` is the well-known transient store (spec §6).
pub fn is_transient_ident(name: &str) -> bool {
    name == TRANSIENT_IDENT
}
