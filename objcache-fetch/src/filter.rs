//! The fetch filter trait and driver (spec §4.5 "Pipeline"), grounded on
//! `cache_fetch_proc.c`'s `VFP_Open`/`VFP_Suck`/`VFP_Fetch_Body`: a stack
//! of filters, each exposing `init`/`pull`/`fini`, driven top-down with
//! `pull` recursing to the filter below until the bottom filter reads
//! straight off the origin connection.

use std::io;

/// What one `pull` call produced.
#[derive(Debug)]
pub enum Pulled {
    /// `n` bytes were written into the caller's buffer; more may follow.
    Ok(usize),
    /// `n` bytes were written and this was the last of the body.
    End(usize),
}

/// A fetch-pipeline error. The first one encountered is latched by
/// [`FilterChain::pull`] (`VFP_Error`'s "issue the first error ... and
/// suppress the rest"); later layers are not re-entered once failed.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The filter's own `init` rejected the stream (bad framing, unsupported
    /// transfer coding, corrupt input already visible at open time).
    #[error("filter {filter} failed to open: {reason}")]
    Open {
        /// Name of the filter that refused to open.
        filter: &'static str,
        /// Why.
        reason: String,
    },
    /// A `pull` call failed partway through the body.
    #[error("filter {filter} failed: {reason}")]
    Pull {
        /// Name of the filter that failed.
        filter: &'static str,
        /// Why.
        reason: String,
    },
    /// The bottom-most (origin I/O) filter hit an I/O error.
    #[error("origin I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A handle the driver passes to `Filter::pull` for reading from the
/// stage below. Calling it is exactly one recursive `pull` one layer down.
pub type Below<'a> = dyn FnMut(&mut [u8]) -> Result<Pulled, FilterError> + 'a;

/// One stage of the fetch pipeline (spec §4.5). `init`/`fini` bracket the
/// whole fetch; `pull` is called repeatedly to drain bytes, calling
/// `below` at most once per call (never buffering ahead of what the
/// driver asked for).
pub trait Filter: Send {
    /// Stable name for diagnostics and `FilterError` messages.
    fn name(&self) -> &'static str;

    /// Prepares this filter to process a fetch. Called bottom-to-top
    /// before the first `pull` (`VFP_Open`).
    fn init(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Pulls up to `buf.len()` bytes from this filter's output, calling
    /// `below` as needed to get input. Returns the number of bytes
    /// written and whether this was the final chunk.
    fn pull(&mut self, below: &mut Below<'_>, buf: &mut [u8]) -> Result<Pulled, FilterError>;

    /// Releases any per-fetch state. Always called, even after a failed
    /// `init` or a mid-stream error (`vfp_suck_fini`'s unconditional
    /// sweep).
    fn fini(&mut self) {}
}

/// The bottom-most filter: reads directly from a byte source (the origin
/// connection, or in tests, an in-memory buffer). Never calls `below`.
pub struct Source<R> {
    reader: R,
}

impl<R> Source<R> {
    /// Wraps a reader as the pipeline's origin.
    pub fn new(reader: R) -> Self {
        Source { reader }
    }
}

impl<R: io::Read + Send> Filter for Source<R> {
    fn name(&self) -> &'static str {
        "source"
    }

    fn pull(&mut self, _below: &mut Below<'_>, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        let n = self.reader.read(buf)?;
        if n == 0 {
            Ok(Pulled::End(0))
        } else {
            Ok(Pulled::Ok(n))
        }
    }
}

/// A linear stack of filters, bottom (closest to origin) first. `pull`
/// drives the top filter once per call; each filter calls `below` as
/// needed (`VFP_Suck`'s `vc->vfp_nxt` walk).
pub struct FilterChain {
    /// Index 0 is the bottom (origin-facing) filter; the last entry is
    /// the top (storage-facing) filter the driver calls into.
    stages: Vec<Box<dyn Filter>>,
    failed: bool,
}

impl FilterChain {
    /// Builds a chain from bottom to top. `stages[0]` must be a source.
    pub fn new(stages: Vec<Box<dyn Filter>>) -> Self {
        assert!(!stages.is_empty(), "a filter chain needs at least a source");
        FilterChain { stages, failed: false }
    }

    /// Runs every stage's `init`, bottom to top. On the first failure,
    /// runs `fini` on everything and returns the error (`VFP_Open`).
    pub fn open(&mut self) -> Result<(), FilterError> {
        for i in 0..self.stages.len() {
            if let Err(reason) = self.stages[i].init() {
                let filter = self.stages[i].name();
                for s in self.stages.iter_mut() {
                    s.fini();
                }
                self.failed = true;
                return Err(FilterError::Open { filter, reason });
            }
        }
        Ok(())
    }

    /// Pulls from the top filter, recursing down through the stack. Once
    /// `failed` has latched, returns the same error without re-entering
    /// any filter (`VFP_Suck`'s "already closed" branch).
    pub fn pull(&mut self, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        if self.failed {
            return Err(FilterError::Pull {
                filter: "chain",
                reason: "pipeline already failed".to_string(),
            });
        }
        let result = Self::pull_stage(&mut self.stages, self.stages.len() - 1, buf);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// Recursive driver: pulls from `stages[index]`, handing it a closure
    /// that recurses into `stages[index - 1]`.
    fn pull_stage(stages: &mut [Box<dyn Filter>], index: usize, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        if index == 0 {
            let mut below: Box<Below<'_>> = Box::new(|_: &mut [u8]| {
                Err(FilterError::Pull {
                    filter: "source",
                    reason: "source filter called below".to_string(),
                })
            });
            return stages[0].pull(&mut below, buf);
        }
        let (rest, top) = stages.split_at_mut(index);
        let mut recurse: Box<Below<'_>> = Box::new(|buf: &mut [u8]| Self::pull_stage(rest, index - 1, buf));
        top[0].pull(&mut recurse, buf)
    }

    /// Whether the pipeline has latched an error.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Runs every stage's `fini`, regardless of outcome.
    pub fn close(&mut self) {
        for s in self.stages.iter_mut() {
            s.fini();
        }
    }
}
