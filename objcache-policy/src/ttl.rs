//! TTL/grace/keep computation from response headers (spec §4.6 "Expiry
//! policy (RFC cache rules)"), grounded on `rfc2616.c`'s `RFC2616_Ttl`:
//! prefer a relative `max-age`/`s-maxage` (adjusted by `Age`, the only
//! case that needs no clock agreement with the origin), else derive a TTL
//! from `Expires`/`Date` with a clock-skew tolerance, else fall back to
//! the configured default.

use http::HeaderMap;
use http::header::{AGE, DATE, EXPIRES};
use objcache_core::Exp;

use crate::cache_control::CacheControl;
use crate::httpdate;

/// How far apart the origin's `Date` and our own clock may be before we
/// stop trusting `Expires` relative to our clock and instead derive a
/// relative TTL from `Expires - Date` (`rfc2616.c`: `params->clock_skew`).
/// Not a runtime-adjustable knob in spec §6's table; the original treats
/// it as one, but this core only needs a sane constant since there is no
/// config-loading surface to expose it through (spec §1, out of scope).
const CLOCK_SKEW_TOLERANCE: f64 = 10.0;

/// Defaults consulted when headers leave TTL/grace/keep unset (spec §6
/// table: `default_ttl`, `default_grace`, `default_keep`).
#[derive(Debug, Clone, Copy)]
pub struct TtlDefaults {
    /// Used when no header establishes a TTL at all.
    pub default_ttl: f64,
    /// Used when no header establishes a grace window.
    pub default_grace: f64,
    /// Used when no header establishes a keep window.
    pub default_keep: f64,
}

impl Default for TtlDefaults {
    fn default() -> Self {
        TtlDefaults {
            default_ttl: 120.0,
            default_grace: 10.0,
            default_keep: 0.0,
        }
    }
}

/// Computes the relative TTL in seconds a response is fresh for, per
/// `RFC2616_Ttl`. `now` is when the response was received (becomes
/// `Exp::t_origin`).
fn relative_ttl(headers: &HeaderMap, cc: &CacheControl, now: f64, defaults: &TtlDefaults) -> f64 {
    if let Some(max_age) = cc.effective_max_age() {
        let age = headers
            .get(AGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        return if age > max_age { 0.0 } else { max_age - age };
    }

    let Some(expires_raw) = headers.get(EXPIRES).and_then(|v| v.to_str().ok()) else {
        return defaults.default_ttl;
    };
    let Some(h_expires) = httpdate::parse(expires_raw).map(|dt| dt.timestamp() as f64) else {
        return defaults.default_ttl;
    };

    let h_date = headers
        .get(DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(httpdate::parse)
        .map(|dt| dt.timestamp() as f64);

    match h_date {
        None => {
            // No Date: header at all — trust Expires relative to our own clock.
            (h_expires - now).max(0.0)
        }
        Some(h_date) if (h_date - now).abs() < CLOCK_SKEW_TOLERANCE => {
            // Clocks agree closely enough: trust Expires relative to our clock.
            (h_expires - now).max(0.0)
        }
        Some(h_date) => {
            // Clocks disagree: fall back to a relative TTL derived purely
            // from the two backend-supplied timestamps, immune to skew.
            (h_expires - h_date).max(0.0)
        }
    }
}

/// Computes the full `Exp` (TTL + grace + keep, anchored at `now`) a
/// fresh response should be inserted with.
pub fn compute_exp(headers: &HeaderMap, cc: &CacheControl, now: f64, defaults: &TtlDefaults) -> Exp {
    let ttl = relative_ttl(headers, cc, now, defaults);

    let grace = if cc.must_revalidate {
        0.0
    } else {
        cc.stale_while_revalidate.unwrap_or(defaults.default_grace)
    };

    let keep = cc.stale_if_error.unwrap_or(defaults.default_keep);

    Exp {
        t_origin: now,
        ttl,
        grace,
        keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{AGE, CACHE_CONTROL, DATE, EXPIRES};

    fn headers(pairs: &[(http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), value.parse().unwrap());
        }
        map
    }

    #[test]
    fn max_age_sets_ttl_directly() {
        let h = headers(&[(CACHE_CONTROL, "max-age=60")]);
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 1_000.0, &TtlDefaults::default());
        assert_eq!(exp.ttl, 60.0);
        assert_eq!(exp.t_origin, 1_000.0);
    }

    #[test]
    fn age_is_subtracted_from_max_age() {
        let h = headers(&[(CACHE_CONTROL, "max-age=60"), (AGE, "20")]);
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 1_000.0, &TtlDefaults::default());
        assert_eq!(exp.ttl, 40.0);
    }

    #[test]
    fn age_past_max_age_yields_zero_ttl() {
        let h = headers(&[(CACHE_CONTROL, "max-age=10"), (AGE, "50")]);
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 1_000.0, &TtlDefaults::default());
        assert_eq!(exp.ttl, 0.0);
    }

    #[test]
    fn no_headers_falls_back_to_default_ttl() {
        let h = HeaderMap::new();
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 1_000.0, &TtlDefaults::default());
        assert_eq!(exp.ttl, TtlDefaults::default().default_ttl);
    }

    #[test]
    fn expires_without_date_is_trusted_relative_to_our_clock() {
        // now = 1994-11-06 08:49:37 UTC = 784111777; expires 60s later.
        let h = headers(&[(EXPIRES, "Sun, 06 Nov 1994 08:50:37 GMT")]);
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 784_111_777.0, &TtlDefaults::default());
        assert_eq!(exp.ttl, 60.0);
    }

    #[test]
    fn stale_while_revalidate_overrides_default_grace() {
        let h = headers(&[(CACHE_CONTROL, "max-age=60, stale-while-revalidate=300")]);
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 1_000.0, &TtlDefaults::default());
        assert_eq!(exp.grace, 300.0);
    }

    #[test]
    fn must_revalidate_zeroes_grace_even_with_swr() {
        let h = headers(&[(
            CACHE_CONTROL,
            "max-age=60, must-revalidate, stale-while-revalidate=300",
        )]);
        let cc = CacheControl::parse(&h);
        let exp = compute_exp(&h, &cc, 1_000.0, &TtlDefaults::default());
        assert_eq!(exp.grace, 0.0);
    }

    #[test]
    fn skewed_date_falls_back_to_expires_minus_date() {
        let h = headers(&[
            (DATE, "Sun, 06 Nov 1994 08:00:00 GMT"),
            (EXPIRES, "Sun, 06 Nov 1994 08:01:00 GMT"),
        ]);
        let cc = CacheControl::parse(&h);
        // our clock is wildly different from the Date header
        let exp = compute_exp(&h, &cc, 2_000_000_000.0, &TtlDefaults::default());
        assert_eq!(exp.ttl, 60.0);
    }
}
