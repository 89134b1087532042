#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! Core data model for the caching engine: digests, the ObjHead/ObjCore
//! rendezvous structures, the per-request workspace allocator, storage
//! segments, and process-wide counters.

pub mod counters;
pub mod digest;
pub mod error;
pub mod flags;
pub mod object;
pub mod objcore;
pub mod objhead;
pub mod segment;
pub mod waiting;
pub mod workspace;

pub use counters::{Counters, GlobalCounters, XidGenerator};
pub use digest::Digest;
pub use error::{CoreError, CoreResult};
pub use flags::ObjFlags;
pub use object::{EsiData, EsiFragment, GzipBits, Object, ObjectFlags, VaryKey};
pub use objcore::{Exp, ObjCore};
pub use objhead::{ObjHead, ObjHeadInner};
pub use segment::{Engine, Segment};
pub use waiting::{ParkSignal, WaitingList, Waiter, WakeReason};
pub use workspace::{Reservation, Snapshot, Workspace, WorkspaceKind};
