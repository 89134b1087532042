//! Parsed `Cache-Control` directives relevant to TTL/grace/keep and
//! cacheability (RFC 7234 §5.2), both request- and response-side.

use http::HeaderMap;
use http::header::CACHE_CONTROL;

/// The subset of `Cache-Control` directives this core's policy engine
/// consults. Unknown directives are ignored rather than rejected (RFC
/// 7234 §5.2: "Cache directives are identified by a token ... A cache
/// MUST ignore unrecognized cache directives").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheControl {
    /// `no-store`: never cache this response.
    pub no_store: bool,
    /// `no-cache`: may cache, but must revalidate before every reuse.
    /// Treated the same as an immediate-expiry `max-age=0` for this
    /// core's grace/keep purposes, since revalidation itself is a
    /// backend-connection concern out of scope for the cache core.
    pub no_cache: bool,
    /// `private`: not shareable between clients (hit-for-pass).
    pub private: bool,
    /// `must-revalidate`: once stale, grace must not be served.
    pub must_revalidate: bool,
    /// `max-age=N`, response or request (request-side overrides are used
    /// by `can_revalidate`/conditional-fetch admission, not TTL math).
    pub max_age: Option<f64>,
    /// `s-maxage=N`: takes precedence over `max-age` for shared caches
    /// (RFC 7234 §5.2.2.9), which this core always is.
    pub s_maxage: Option<f64>,
    /// `stale-while-revalidate=N`: an explicit grace window (RFC 5861).
    pub stale_while_revalidate: Option<f64>,
    /// `stale-if-error=N`: folded into `keep` by this implementation,
    /// since this core has no distinct "serve stale on origin error"
    /// path beyond the conditional-fetch keep window.
    pub stale_if_error: Option<f64>,
}

impl CacheControl {
    /// Parses every `Cache-Control` header present in `headers` (there
    /// may legally be more than one; RFC 7234 treats them as one
    /// comma-joined list).
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut cc = CacheControl::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(text) = value.to_str() else { continue };
            for directive in text.split(',') {
                cc.apply(directive.trim());
            }
        }
        cc
    }

    fn apply(&mut self, directive: &str) {
        let (name, arg) = match directive.split_once('=') {
            Some((n, v)) => (n.trim(), Some(v.trim().trim_matches('"'))),
            None => (directive, None),
        };
        let as_f64 = || arg.and_then(|v| v.parse::<f64>().ok());
        match name.to_ascii_lowercase().as_str() {
            "no-store" => self.no_store = true,
            "no-cache" => self.no_cache = true,
            "private" => self.private = true,
            "must-revalidate" | "proxy-revalidate" => self.must_revalidate = true,
            "max-age" => self.max_age = as_f64(),
            "s-maxage" => self.s_maxage = as_f64(),
            "stale-while-revalidate" => self.stale_while_revalidate = as_f64(),
            "stale-if-error" => self.stale_if_error = as_f64(),
            _ => {}
        }
    }

    /// The effective max-age for a shared cache: `s-maxage` if present,
    /// else `max-age` (RFC 7234 §5.2.2.9).
    pub fn effective_max_age(&self) -> Option<f64> {
        self.s_maxage.or(self.max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for v in values {
            map.append(CACHE_CONTROL, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn parses_max_age_and_no_store() {
        let cc = CacheControl::parse(&headers(&["max-age=60, no-store"]));
        assert_eq!(cc.max_age, Some(60.0));
        assert!(cc.no_store);
    }

    #[test]
    fn s_maxage_takes_precedence_for_effective_max_age() {
        let cc = CacheControl::parse(&headers(&["max-age=60, s-maxage=120"]));
        assert_eq!(cc.effective_max_age(), Some(120.0));
    }

    #[test]
    fn multiple_header_lines_are_merged() {
        let cc = CacheControl::parse(&headers(&["max-age=60", "private"]));
        assert_eq!(cc.max_age, Some(60.0));
        assert!(cc.private);
    }

    #[test]
    fn unrecognized_directive_is_ignored_not_rejected() {
        let cc = CacheControl::parse(&headers(&["max-age=60, some-vendor-extension=x"]));
        assert_eq!(cc.max_age, Some(60.0));
    }

    #[test]
    fn stale_while_revalidate_is_captured() {
        let cc = CacheControl::parse(&headers(&["max-age=10, stale-while-revalidate=30"]));
        assert_eq!(cc.stale_while_revalidate, Some(30.0));
    }
}
