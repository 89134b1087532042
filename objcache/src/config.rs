//! Runtime-adjustable configuration knobs (spec §6 table).
//!
//! Every field is backed by an atomic cell rather than a plain value, since
//! the spec requires all of these to be changeable while worker threads are
//! already running against the `Core` they belong to. Durations are stored
//! as `f64` seconds bit-packed into an `AtomicU64`, mirroring the same
//! trick `objcache_expiry::clock::ManualClock` uses for its own time value.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

struct AtomicSeconds(AtomicU64);

impl AtomicSeconds {
    fn new(v: f64) -> Self {
        AtomicSeconds(AtomicU64::new(v.to_bits()))
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// The knob table of spec §6, each field live-adjustable via its setter.
///
/// Construct with [`Params::builder`] for a one-shot override of a few
/// fields, or mutate a shared `Arc<Params>` in place with the setters at
/// any time — there is no "apply" step, every getter reflects the latest
/// `set_*` call immediately.
pub struct Params {
    default_ttl: AtomicSeconds,
    default_grace: AtomicSeconds,
    default_keep: AtomicSeconds,
    lru_interval: AtomicSeconds,
    shortlived: AtomicSeconds,
    nuke_limit: AtomicUsize,
    fetch_chunksize: AtomicUsize,
    fetch_maxchunksize: AtomicUsize,
    ban_lurker_age: AtomicSeconds,
    ban_lurker_sleep: AtomicSeconds,
    ban_lurker_batch: AtomicUsize,
    ban_dups: AtomicBool,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            default_ttl: AtomicSeconds::new(120.0),
            default_grace: AtomicSeconds::new(10.0),
            default_keep: AtomicSeconds::new(0.0),
            lru_interval: AtomicSeconds::new(2.0),
            shortlived: AtomicSeconds::new(10.0),
            nuke_limit: AtomicUsize::new(50),
            fetch_chunksize: AtomicUsize::new(16 * 1024),
            fetch_maxchunksize: AtomicUsize::new(256 * 1024 * 1024),
            ban_lurker_age: AtomicSeconds::new(60.0),
            ban_lurker_sleep: AtomicSeconds::new(0.010),
            ban_lurker_batch: AtomicUsize::new(1000),
            ban_dups: AtomicBool::new(true),
        }
    }
}

macro_rules! seconds_accessor {
    ($field:ident, $getter:ident, $setter:ident) => {
        #[doc = concat!("Current `", stringify!($field), "` value, in seconds.")]
        pub fn $getter(&self) -> f64 {
            self.$field.get()
        }

        #[doc = concat!("Sets `", stringify!($field), "`, in seconds.")]
        pub fn $setter(&self, v: f64) {
            self.$field.set(v);
        }
    };
}

macro_rules! usize_accessor {
    ($field:ident, $getter:ident, $setter:ident) => {
        #[doc = concat!("Current `", stringify!($field), "` value.")]
        pub fn $getter(&self) -> usize {
            self.$field.load(Ordering::Relaxed)
        }

        #[doc = concat!("Sets `", stringify!($field), "`.")]
        pub fn $setter(&self, v: usize) {
            self.$field.store(v, Ordering::Relaxed);
        }
    };
}

impl Params {
    /// A fresh knob table at the spec's documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a [`ParamsBuilder`] for overriding a handful of defaults at
    /// construction time.
    pub fn builder() -> ParamsBuilder {
        ParamsBuilder::default()
    }

    seconds_accessor!(default_ttl, default_ttl, set_default_ttl);
    seconds_accessor!(default_grace, default_grace, set_default_grace);
    seconds_accessor!(default_keep, default_keep, set_default_keep);
    seconds_accessor!(lru_interval, lru_interval, set_lru_interval);
    seconds_accessor!(shortlived, shortlived, set_shortlived);
    seconds_accessor!(ban_lurker_age, ban_lurker_age, set_ban_lurker_age);
    seconds_accessor!(ban_lurker_sleep, ban_lurker_sleep, set_ban_lurker_sleep);

    usize_accessor!(nuke_limit, nuke_limit, set_nuke_limit);
    usize_accessor!(fetch_chunksize, fetch_chunksize, set_fetch_chunksize);
    usize_accessor!(fetch_maxchunksize, fetch_maxchunksize, set_fetch_maxchunksize);
    usize_accessor!(ban_lurker_batch, ban_lurker_batch, set_ban_lurker_batch);

    /// Whether inserting a ban supersedes an existing identical one.
    pub fn ban_dups(&self) -> bool {
        self.ban_dups.load(Ordering::Relaxed)
    }

    /// Sets the `ban_dups` knob.
    pub fn set_ban_dups(&self, v: bool) {
        self.ban_dups.store(v, Ordering::Relaxed);
    }

    /// The defaults this engine falls back to when policy leaves TTL/grace
    /// unset, as an [`objcache_policy::TtlDefaults`].
    pub fn ttl_defaults(&self) -> objcache_policy::TtlDefaults {
        objcache_policy::TtlDefaults {
            default_ttl: self.default_ttl(),
            default_grace: self.default_grace(),
            default_keep: self.default_keep(),
        }
    }

    /// The lurker knobs, as an [`objcache_ban::LurkerConfig`].
    pub fn lurker_config(&self) -> objcache_ban::LurkerConfig {
        objcache_ban::LurkerConfig {
            ban_lurker_age: self.ban_lurker_age(),
            ban_lurker_sleep: std::time::Duration::from_secs_f64(self.ban_lurker_sleep()),
            ban_lurker_batch: self.ban_lurker_batch(),
        }
    }
}

/// Builder for [`Params`], for overriding a handful of defaults without
/// writing out every field.
#[derive(Default)]
pub struct ParamsBuilder {
    overrides: Vec<Box<dyn FnOnce(&Params) + Send>>,
}

impl ParamsBuilder {
    /// Overrides `default_ttl`, in seconds.
    pub fn default_ttl(mut self, v: f64) -> Self {
        self.overrides.push(Box::new(move |p| p.set_default_ttl(v)));
        self
    }

    /// Overrides `default_grace`, in seconds.
    pub fn default_grace(mut self, v: f64) -> Self {
        self.overrides.push(Box::new(move |p| p.set_default_grace(v)));
        self
    }

    /// Overrides `default_keep`, in seconds.
    pub fn default_keep(mut self, v: f64) -> Self {
        self.overrides.push(Box::new(move |p| p.set_default_keep(v)));
        self
    }

    /// Overrides `shortlived`, in seconds.
    pub fn shortlived(mut self, v: f64) -> Self {
        self.overrides.push(Box::new(move |p| p.set_shortlived(v)));
        self
    }

    /// Overrides `nuke_limit`.
    pub fn nuke_limit(mut self, v: usize) -> Self {
        self.overrides.push(Box::new(move |p| p.set_nuke_limit(v)));
        self
    }

    /// Overrides `fetch_chunksize`.
    pub fn fetch_chunksize(mut self, v: usize) -> Self {
        self.overrides.push(Box::new(move |p| p.set_fetch_chunksize(v)));
        self
    }

    /// Builds the [`Params`], applying overrides over the documented
    /// defaults in the order they were called.
    pub fn build(self) -> Params {
        let params = Params::new();
        for apply in self.overrides {
            apply(&params);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let p = Params::new();
        assert_eq!(p.default_ttl(), 120.0);
        assert_eq!(p.default_grace(), 10.0);
        assert_eq!(p.default_keep(), 0.0);
        assert_eq!(p.lru_interval(), 2.0);
        assert_eq!(p.shortlived(), 10.0);
        assert_eq!(p.nuke_limit(), 50);
        assert_eq!(p.fetch_chunksize(), 16 * 1024);
        assert_eq!(p.fetch_maxchunksize(), 256 * 1024 * 1024);
        assert_eq!(p.ban_lurker_age(), 60.0);
        assert_eq!(p.ban_lurker_sleep(), 0.010);
        assert_eq!(p.ban_lurker_batch(), 1000);
        assert!(p.ban_dups());
    }

    #[test]
    fn setters_are_visible_immediately() {
        let p = Params::new();
        p.set_nuke_limit(5);
        assert_eq!(p.nuke_limit(), 5);
    }

    #[test]
    fn builder_overrides_only_named_fields() {
        let p = Params::builder().default_ttl(30.0).nuke_limit(3).build();
        assert_eq!(p.default_ttl(), 30.0);
        assert_eq!(p.nuke_limit(), 3);
        assert_eq!(p.default_grace(), 10.0);
    }
}
