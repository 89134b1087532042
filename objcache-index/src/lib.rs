#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod index;
pub mod request;

pub use index::{LookupOutcome, ObjIndex, short_lived_exp};
pub use request::{LookupHints, LookupRequest};
