#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod list;
pub mod lurker;
pub mod predicate;

pub use list::{BanEntry, BanList, BanOutcome};
pub use lurker::{BanLurker, CandidateSource, LurkerCandidate, LurkerConfig};
pub use predicate::{BanField, BanOp, BanOperand, BanPredicate, BanPredicateError, BanTarget};
