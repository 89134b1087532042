//! Concrete fetch filters (spec §4.5): identity passthrough, gunzip
//! (store the identity form of a gzip'd backend response), gzip (store
//! the gzip form of an identity backend response), and digest-verify
//! (validate a gzip'd backend response's integrity without re-expanding
//! it, for the common case where the backend is already serving gzip and
//! the cache stores it as-is).

use crate::filter::{Below, Filter, FilterError, Pulled};
use crate::gzip::{Decoder, Encoder};

/// Passes bytes through unchanged. The default bottom-adjacent filter
/// when no transformation applies.
pub struct Identity;

impl Filter for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn pull(&mut self, below: &mut Below<'_>, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        below(buf)
    }
}

/// Gzip-compresses the body as it is pulled, so storage holds the gzip
/// form regardless of what the backend sent.
pub struct Gzip {
    encoder: Encoder,
    below_done: bool,
}

impl Gzip {
    pub fn new() -> Self {
        Gzip {
            encoder: Encoder::new(),
            below_done: false,
        }
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn pull(&mut self, below: &mut Below<'_>, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        if !self.encoder.has_output() && !self.below_done {
            let mut chunk = [0u8; 8192];
            match below(&mut chunk)? {
                Pulled::Ok(n) => self.encoder.push(&chunk[..n]),
                Pulled::End(n) => {
                    self.encoder.push(&chunk[..n]);
                    self.encoder.finish();
                    self.below_done = true;
                }
            }
        }
        let n = self.encoder.drain(buf);
        if self.below_done && self.encoder.is_finished() {
            Ok(Pulled::End(n))
        } else {
            Ok(Pulled::Ok(n))
        }
    }
}

/// Gunzips the body as it is pulled, so storage holds the identity form
/// even when the backend sent gzip. Rejects a truncated or corrupt gzip
/// stream (bad magic, deflate error, CRC32/ISIZE trailer mismatch).
pub struct Gunzip {
    decoder: Decoder,
    below_done: bool,
}

impl Gunzip {
    pub fn new() -> Self {
        Gunzip {
            decoder: Decoder::new(),
            below_done: false,
        }
    }
}

impl Default for Gunzip {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Gunzip {
    fn name(&self) -> &'static str {
        "gunzip"
    }

    fn pull(&mut self, below: &mut Below<'_>, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        while !self.decoder.has_output() && !self.below_done {
            let mut chunk = [0u8; 8192];
            let (n, end) = match below(&mut chunk)? {
                Pulled::Ok(n) => (n, false),
                Pulled::End(n) => (n, true),
            };
            self.decoder
                .push(&chunk[..n])
                .map_err(|reason| FilterError::Pull { filter: "gunzip", reason })?;
            if end {
                self.below_done = true;
            }
        }
        let n = self.decoder.drain(buf);
        if self.below_done && self.decoder.is_done() {
            Ok(Pulled::End(n))
        } else {
            Ok(Pulled::Ok(n))
        }
    }
}

/// Verifies a gzip'd body's integrity while passing the original
/// (still-compressed) bytes straight through, mirroring the original
/// `vfp_testgzip` filter: the cache stores what the backend sent
/// unmodified, but refuses to admit a corrupt gzip stream.
pub struct DigestVerify {
    shadow: Decoder,
    below_done: bool,
    pending: std::collections::VecDeque<u8>,
}

impl DigestVerify {
    pub fn new() -> Self {
        DigestVerify {
            shadow: Decoder::new(),
            below_done: false,
            pending: std::collections::VecDeque::new(),
        }
    }
}

impl Default for DigestVerify {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for DigestVerify {
    fn name(&self) -> &'static str {
        "digest-verify"
    }

    fn pull(&mut self, below: &mut Below<'_>, buf: &mut [u8]) -> Result<Pulled, FilterError> {
        if self.pending.is_empty() && !self.below_done {
            let mut chunk = [0u8; 8192];
            let (n, end) = match below(&mut chunk)? {
                Pulled::Ok(n) => (n, false),
                Pulled::End(n) => (n, true),
            };
            self.shadow
                .push(&chunk[..n])
                .map_err(|reason| FilterError::Pull { filter: "digest-verify", reason })?;
            self.pending.extend(&chunk[..n]);
            let mut scratch = [0u8; 8192];
            while self.shadow.drain(&mut scratch) > 0 {
                // discard: only used to drive the trailer check
            }
            if end {
                self.below_done = true;
                if !self.shadow.is_done() {
                    return Err(FilterError::Pull {
                        filter: "digest-verify",
                        reason: "gzip stream ended before trailer was verified".to_string(),
                    });
                }
            }
        }
        let n = self.pending.len().min(buf.len());
        for (slot, byte) in buf[..n].iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        if self.below_done && self.pending.is_empty() {
            Ok(Pulled::End(n))
        } else {
            Ok(Pulled::Ok(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterChain, Source};
    use std::io::Cursor;

    fn drain(chain: &mut FilterChain) -> Vec<u8> {
        let mut buf = [0u8; 37];
        let mut total = Vec::new();
        loop {
            match chain.pull(&mut buf).unwrap() {
                Pulled::Ok(n) => total.extend_from_slice(&buf[..n]),
                Pulled::End(n) => {
                    total.extend_from_slice(&buf[..n]);
                    break;
                }
            }
        }
        total
    }

    #[test]
    fn identity_passes_bytes_through_unchanged() {
        let mut chain = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(b"pass me through".to_vec()))),
            Box::new(Identity),
        ]);
        chain.open().unwrap();
        assert_eq!(drain(&mut chain), b"pass me through");
    }

    #[test]
    fn gzip_then_gunzip_round_trips() {
        let body = b"the quick brown fox jumps over the lazy dog".repeat(50);

        let mut encode = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(body.clone()))),
            Box::new(Gzip::new()),
        ]);
        encode.open().unwrap();
        let compressed = drain(&mut encode);

        let mut decode = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(compressed))),
            Box::new(Gunzip::new()),
        ]);
        decode.open().unwrap();
        assert_eq!(drain(&mut decode), body);
    }

    #[test]
    fn digest_verify_passes_through_valid_gzip_unchanged() {
        let body = b"hello digest verify";

        let mut encode = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(body.to_vec()))),
            Box::new(Gzip::new()),
        ]);
        encode.open().unwrap();
        let compressed = drain(&mut encode);

        let mut verify = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(compressed.clone()))),
            Box::new(DigestVerify::new()),
        ]);
        verify.open().unwrap();
        assert_eq!(drain(&mut verify), compressed);
    }

    #[test]
    fn digest_verify_rejects_corrupted_gzip() {
        let mut encode = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(b"some content".to_vec()))),
            Box::new(Gzip::new()),
        ]);
        encode.open().unwrap();
        let mut compressed = drain(&mut encode);
        let last = compressed.len() - 1;
        compressed[last] ^= 0xff;

        let mut verify = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(compressed))),
            Box::new(DigestVerify::new()),
        ]);
        verify.open().unwrap();
        let mut buf = [0u8; 64];
        let mut saw_error = false;
        loop {
            match verify.pull(&mut buf) {
                Ok(Pulled::Ok(_)) => continue,
                Ok(Pulled::End(_)) => break,
                Err(_) => {
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }
}
