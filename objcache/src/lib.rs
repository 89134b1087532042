#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod delivery;
pub mod stats;
pub mod storage;

pub use config::{Params, ParamsBuilder};
pub use core::{BanTargetFor, Core};
pub use delivery::{DeliverChunk, DeliverIter};
pub use stats::{snapshot, Snapshot, StoreSnapshot};
pub use storage::{open, StevedoreSpec};
