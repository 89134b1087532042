#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod cache_control;
pub mod cacheability;
pub mod httpdate;
pub mod ttl;
pub mod vary;

pub use cache_control::CacheControl;
pub use cacheability::{Decision, beresp_cacheable};
pub use ttl::{TtlDefaults, compute_exp};
pub use vary::{build_vary_key, is_vary_star, matches as vary_matches};
