//! The full response [`Object`] (spec §3, "Object").
//!
//! An `Object` is the body-bearing counterpart to the small in-index
//! [`ObjCore`](crate::objcore::ObjCore) proxy. It lives for exactly as long
//! as its owning `ObjCore` (spec: "An Object is exclusively owned by its
//! ObjCore").

use std::sync::Arc;
use std::time::SystemTime;

use http::HeaderMap;
use smol_str::SmolStr;

use crate::segment::Segment;

/// Byte offsets into a gzip stream that a cache needs to remember to avoid
/// re-scanning on every delivery: where the deflate stream starts, where
/// the last full block ended, and where the stream stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GzipBits {
    /// Offset of the first deflate block.
    pub start: u64,
    /// Offset of the last complete deflate block.
    pub last: u64,
    /// Offset one past the final byte of the gzip stream.
    pub stop: u64,
}

/// Encoded Vary key: the request header values that must match the
/// original request for this variant to be reused.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaryKey {
    /// `(header name, normalized value)` pairs, in the order the response's
    /// `Vary` header listed them. `SmolStr` avoids a heap allocation per
    /// entry for the common case of short header names/values.
    pub entries: Vec<(SmolStr, SmolStr)>,
}

impl VaryKey {
    /// Whether `request_headers` matches every entry in this vary key.
    ///
    /// A header present in the vary key but absent from the request
    /// matches only if the original value was also absent (both
    /// represented as `None` via an empty normalized value of `""`
    /// never being conflated with "absent" — callers pass the normalized
    /// value or `None`).
    pub fn matches<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
        self.entries
            .iter()
            .all(|(name, value)| lookup(name).unwrap_or("") == value)
    }
}

/// Flags describing how the body is stored, distinct from the `ObjCore`
/// lifecycle flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectFlags {
    /// The stored body is gzip-compressed (the cache normalizes storage
    /// form independent of what the client asked for).
    pub gzipped: bool,
}

/// Placeholder for Edge Side Includes child linkage.
///
/// ESI parsing is out of scope for this core (it belongs to the VCL/markup
/// layer); this slot exists so the pipeline shape described in spec §4.5
/// is complete and a future ESI filter has somewhere to record its output.
#[derive(Clone, Debug, Default)]
pub struct EsiData {
    /// Byte ranges of the body that are literal text versus `<esi:include>`
    /// placeholders, as produced by an (unimplemented) ESI parse filter.
    pub fragments: Vec<EsiFragment>,
}

/// One fragment of an ESI-parsed body.
#[derive(Clone, Debug)]
pub enum EsiFragment {
    /// A literal byte range of the body.
    Literal { start: u64, len: u64 },
    /// An include directive resolved to a sub-request digest, subject to
    /// its own cache lookup at delivery time.
    Include { target: String },
}

/// The full cached response: headers, vary key, body segments and the
/// bookkeeping needed to serve gzip transformations without re-parsing.
pub struct Object {
    headers: HeaderMap,
    vary: Option<VaryKey>,
    gzip: Option<GzipBits>,
    flags: ObjectFlags,
    last_modified: Option<SystemTime>,
    segments: Vec<Arc<Segment>>,
    esi: Option<EsiData>,
    /// Transaction id, for correlating this object with the request/fetch
    /// that produced it in logs.
    xid: u64,
}

impl Object {
    /// Creates an empty object (no segments yet) for a fetch to populate.
    pub fn new(xid: u64, headers: HeaderMap) -> Self {
        Object {
            headers,
            vary: None,
            gzip: None,
            flags: ObjectFlags::default(),
            last_modified: None,
            segments: Vec::new(),
            esi: None,
            xid,
        }
    }

    /// Response headers, in their compact in-memory form.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers (used by the fetch pipeline while
    /// `beresp` processing is still deciding on cacheability).
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// This object's Vary key, if the response carried a `Vary` header.
    pub fn vary(&self) -> Option<&VaryKey> {
        self.vary.as_ref()
    }

    /// Sets the Vary key.
    pub fn set_vary(&mut self, vary: Option<VaryKey>) {
        self.vary = vary;
    }

    /// Gzip bookkeeping, if the stored body is gzip-compressed.
    pub fn gzip_bits(&self) -> Option<GzipBits> {
        self.gzip
    }

    /// Sets gzip bookkeeping.
    pub fn set_gzip_bits(&mut self, bits: Option<GzipBits>) {
        self.gzip = bits;
    }

    /// Object-level storage flags.
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    /// Sets object-level storage flags.
    pub fn set_flags(&mut self, flags: ObjectFlags) {
        self.flags = flags;
    }

    /// Last-Modified time of the origin response, if present.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Sets Last-Modified.
    pub fn set_last_modified(&mut self, when: Option<SystemTime>) {
        self.last_modified = when;
    }

    /// The body, as an ordered list of segments; concatenation is the full
    /// body. Segments are shared (`Arc`) rather than owned outright so a
    /// streaming delivery can hold a clone of the segment the fetcher is
    /// still extending (spec §4.5, "Streaming visibility") alongside the
    /// one installed here once the fetch finishes.
    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Appends a segment to the body (append-only during fetch).
    pub fn push_segment(&mut self, segment: Arc<Segment>) {
        self.segments.push(segment);
    }

    /// Total committed body length across all segments.
    pub fn body_len(&self) -> u64 {
        self.segments.iter().map(|s| s.len() as u64).sum()
    }

    /// Releases all body segments back to their engines, retaining
    /// headers. Used by the `slim` nuke-under-pressure path (spec §3,
    /// lifecycle step 4b).
    pub fn slim(&mut self) -> Vec<Arc<Segment>> {
        std::mem::take(&mut self.segments)
    }

    /// Optional ESI fragment map.
    pub fn esi(&self) -> Option<&EsiData> {
        self.esi.as_ref()
    }

    /// Sets the ESI fragment map.
    pub fn set_esi(&mut self, esi: Option<EsiData>) {
        self.esi = esi;
    }

    /// Transaction id.
    pub fn xid(&self) -> u64 {
        self.xid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vary_key_matches_exact_values() {
        let vary = VaryKey {
            entries: vec![("accept-encoding".into(), "gzip".into())],
        };
        assert!(vary.matches(|h| if h == "accept-encoding" {
            Some("gzip")
        } else {
            None
        }));
        assert!(!vary.matches(|h| if h == "accept-encoding" {
            Some("br")
        } else {
            None
        }));
    }

    #[test]
    fn vary_key_treats_missing_header_as_empty_value() {
        let vary = VaryKey {
            entries: vec![("x-custom".into(), "".into())],
        };
        assert!(vary.matches(|_| None));
    }

    #[test]
    fn slim_drains_segments_but_keeps_headers() {
        let mut obj = Object::new(1, HeaderMap::new());
        obj.headers_mut().insert("content-type", "text/plain".parse().unwrap());
        let drained = obj.slim();
        assert!(drained.is_empty());
        assert!(obj.headers().contains_key("content-type"));
    }
}
