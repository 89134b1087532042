#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod busy;
pub mod coalesce;
pub mod driver;
pub mod filter;
pub mod filters;
pub mod gzip;

pub use busy::{BusyObject, DoClose, FetchState};
pub use coalesce::{admit, abandon, Admission};
pub use driver::run_fetch;
pub use filter::{Below, Filter, FilterChain, FilterError, Pulled, Source};
pub use filters::{DigestVerify, Gunzip, Gzip, Identity};
pub use gzip::{Decoder, Encoder};
