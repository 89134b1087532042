#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! The [`Stevedore`] storage engine trait, the per-store LRU list, and
//! per-store observability gauges (spec §3 "Storage engine"; §4.2; §4.4
//! "Touch policy"/"Nuke-one").
//!
//! Concrete engines (file-backed, malloc-backed, transient/synthetic) live
//! in their own crates so each can carry its own dependency (`memmap2` for
//! the file engine, nothing extra for malloc) without bloating this one.

pub mod gauges;
pub mod lru;
pub mod stevedore;

pub use gauges::Gauges;
pub use lru::{LruList, Store};
pub use stevedore::{Stevedore, StevedoreHandle, TRANSIENT_IDENT};
