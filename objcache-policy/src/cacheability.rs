//! Whether a backend response may enter the cache at all, before TTL
//! computation even runs. Grounded on `rfc2616.c`'s
//! `RFC2616_cache_policy`: a whitelist of status codes, narrowed further
//! by `Cache-Control: no-store`/`private` and request-side `Authorization`.

use http::{HeaderMap, StatusCode};
use http::header::AUTHORIZATION;

use crate::cache_control::CacheControl;

/// Status codes the core will consider caching at all (`rfc2616.c`:
/// `http_IsStatusCode` against `{200, 203, 300, 301, 302, 404, 410}`; 206
/// Partial Content is deliberately excluded — byte-range responses need
/// range-aware storage this core does not implement).
const CACHEABLE_STATUS: [u16; 7] = [200, 203, 300, 301, 302, 404, 410];

/// Outcome of the beresp-cacheability decision (spec §6,
/// `beresp_cacheable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Store normally and serve to any matching request.
    Cacheable,
    /// Stream through without storing; a bare miss on every request.
    Pass,
    /// Cache only the fact that this URL is uncacheable for
    /// `shortlived` seconds, so concurrent requests also pass instead of
    /// independently hammering the backend (spec §4.6).
    HitForMiss,
}

/// Decides whether a response may be cached, per RFC 7234 §3 and the
/// status-code whitelist above.
///
/// `request_headers` is consulted for `Authorization`, per RFC 7234
/// §3.2: a response to an authenticated request is cacheable only if the
/// response explicitly allows it (`public`, `must-revalidate`, or an
/// explicit `max-age`/`s-maxage`).
pub fn beresp_cacheable(
    status: StatusCode,
    response_headers: &HeaderMap,
    request_headers: &HeaderMap,
) -> Decision {
    let cc = CacheControl::parse(response_headers);

    if cc.no_store {
        return Decision::Pass;
    }
    if cc.private {
        return Decision::HitForMiss;
    }

    if request_headers.contains_key(AUTHORIZATION)
        && cc.effective_max_age().is_none()
        && !cc.must_revalidate
    {
        return Decision::Pass;
    }

    if !CACHEABLE_STATUS.contains(&status.as_u16()) {
        return Decision::HitForMiss;
    }

    Decision::Cacheable
}
