//! Builds a [`VaryKey`] from a response's `Vary` header and the request
//! that produced it (spec §4.6, "Vary matching"), and matches a
//! candidate object's vary key against a new request.

use http::HeaderMap;
use http::header::VARY;
use objcache_core::VaryKey;

/// Builds the vary key to store alongside a freshly fetched object, by
/// reading the header names listed in the response's `Vary` header out of
/// the *request* that produced it.
///
/// `Vary: *` makes the response effectively unreusable by any future
/// request; callers should treat that case as "never reuse" rather than
/// calling this (mirrored by `is_vary_star` below).
pub fn build_vary_key(response_headers: &HeaderMap, request_headers: &HeaderMap) -> Option<VaryKey> {
    let raw = response_headers.get(VARY)?.to_str().ok()?;
    if raw.trim() == "*" {
        return Some(VaryKey { entries: Vec::new() });
    }

    let entries = raw
        .split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .map(|name| {
            let value = request_headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            (name.into(), value.into())
        })
        .collect();

    Some(VaryKey { entries })
}

/// Whether a response's raw `Vary` header is exactly `*`, meaning the
/// response can never be matched again by vary comparison and must be
/// treated as hit-for-pass.
pub fn is_vary_star(response_headers: &HeaderMap) -> bool {
    response_headers
        .get(VARY)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "*")
}

/// Whether `candidate`'s vary key matches the headers of a new request.
pub fn matches(candidate: &VaryKey, request_headers: &HeaderMap) -> bool {
    candidate.matches(|name| request_headers.get(name).and_then(|v| v.to_str().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ACCEPT_ENCODING;

    fn headers(pairs: &[(http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), value.parse().unwrap());
        }
        map
    }

    #[test]
    fn builds_key_from_request_headers_named_by_vary() {
        let resp = headers(&[(VARY, "Accept-Encoding")]);
        let req = headers(&[(ACCEPT_ENCODING, "gzip")]);
        let key = build_vary_key(&resp, &req).unwrap();
        assert_eq!(key.entries, vec![("accept-encoding".into(), "gzip".into())]);
    }

    #[test]
    fn absent_request_header_records_empty_value() {
        let resp = headers(&[(VARY, "X-Custom")]);
        let key = build_vary_key(&resp, &HeaderMap::new()).unwrap();
        assert_eq!(key.entries, vec![("x-custom".into(), "".into())]);
    }

    #[test]
    fn no_vary_header_yields_no_key() {
        assert!(build_vary_key(&HeaderMap::new(), &HeaderMap::new()).is_none());
    }

    #[test]
    fn star_is_detected_and_yields_empty_key() {
        let resp = headers(&[(VARY, "*")]);
        assert!(is_vary_star(&resp));
        assert!(build_vary_key(&resp, &HeaderMap::new()).unwrap().entries.is_empty());
    }

    #[test]
    fn matches_reuses_varykey_matches() {
        let resp = headers(&[(VARY, "Accept-Encoding")]);
        let original_req = headers(&[(ACCEPT_ENCODING, "gzip")]);
        let key = build_vary_key(&resp, &original_req).unwrap();

        let same_req = headers(&[(ACCEPT_ENCODING, "gzip")]);
        assert!(matches(&key, &same_req));

        let different_req = headers(&[(ACCEPT_ENCODING, "br")]);
        assert!(!matches(&key, &different_req));
    }
}
