//! Hand-rolled gzip container framing around `flate2`'s low-level raw
//! deflate codec, used by [`crate::filters::Gzip`] and
//! [`crate::filters::Gunzip`]/[`crate::filters::DigestVerify`].
//!
//! A pull-based filter cannot use `flate2`'s `Read`-adapter encoders and
//! decoders (`flate2::read::GzEncoder`/`GzDecoder`): those own their
//! source reader and assume a blocking `read()` that only returns `Ok(0)`
//! at true end-of-stream, but a filter only gets one batch of bytes from
//! `below` per `pull()` call and must be able to report "no output yet,
//! come back later" without that being mistaken for EOF. So the framing
//! (10-byte minimal header, CRC32 + ISIZE trailer) is written directly
//! against `flate2::{Compress, Decompress, Crc}`, mirroring the original
//! `cache_gzip.c`'s own hand-written header/trailer handling.

use std::collections::VecDeque;

use flate2::{Compress, Compression, Crc, Decompress, FlushCompress, FlushDecompress, Status};

/// RFC 1952 minimal gzip header: magic, CM=8 (deflate), FLG=0 (no
/// optional fields), MTIME=0 (unknown), XFL=0, OS=255 (unknown).
const HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];
const TRAILER_LEN: usize = 8;

/// Gzip-encodes a byte stream incrementally: feed input chunks with
/// [`Encoder::push`], take output chunks with [`Encoder::drain`].
pub struct Encoder {
    compress: Compress,
    crc: Crc,
    out: VecDeque<u8>,
    header_sent: bool,
    finished: bool,
}

impl Encoder {
    pub fn new() -> Self {
        let mut out = VecDeque::new();
        out.extend(HEADER);
        Encoder {
            compress: Compress::new(Compression::default(), false),
            crc: Crc::new(),
            out,
            header_sent: false,
            finished: false,
        }
    }

    /// Feeds `input` through the deflate stream, buffering compressed
    /// output for [`Self::drain`].
    pub fn push(&mut self, input: &[u8]) {
        self.crc.update(input);
        let mut scratch = [0u8; 8192];
        let mut offset = 0;
        while offset < input.len() {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let _ = self
                .compress
                .compress(&input[offset..], &mut scratch, FlushCompress::None);
            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            self.out.extend(&scratch[..produced]);
            offset += consumed;
            if consumed == 0 && produced == 0 {
                break;
            }
        }
    }

    /// Flushes the deflate stream and appends the CRC32/ISIZE trailer.
    /// Idempotent past the first call.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        let mut scratch = [0u8; 8192];
        loop {
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(&[], &mut scratch, FlushCompress::Finish)
                .unwrap_or(Status::StreamEnd);
            let produced = (self.compress.total_out() - before_out) as usize;
            self.out.extend(&scratch[..produced]);
            if status == Status::StreamEnd || produced == 0 {
                break;
            }
        }
        self.out.extend(self.crc.sum().to_le_bytes());
        self.out.extend(self.crc.amount().to_le_bytes());
        self.finished = true;
    }

    /// Drains up to `buf.len()` bytes of compressed output.
    pub fn drain(&mut self, buf: &mut [u8]) -> usize {
        let n = self.out.len().min(buf.len());
        for (slot, byte) in buf[..n].iter_mut().zip(self.out.drain(..n)) {
            *slot = byte;
        }
        n
    }

    pub fn has_output(&self) -> bool {
        !self.out.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.out.is_empty()
    }
}

/// Gzip-decodes a byte stream incrementally, validating the trailer
/// against the decompressed content's CRC32 and length.
pub struct Decoder {
    decompress: Decompress,
    crc: Crc,
    header_buf: Vec<u8>,
    header_parsed: bool,
    trailer_buf: Vec<u8>,
    out: VecDeque<u8>,
    stream_ended: bool,
    verified: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            decompress: Decompress::new(false),
            crc: Crc::new(),
            header_buf: Vec::with_capacity(HEADER.len()),
            header_parsed: false,
            trailer_buf: Vec::with_capacity(TRAILER_LEN),
            out: VecDeque::new(),
            stream_ended: false,
            verified: false,
        }
    }

    /// Feeds raw (gzip-framed) bytes in. Consumes the header once enough
    /// bytes have accumulated, runs the rest through raw inflate, and
    /// once inflate reports `StreamEnd`, starts collecting and validating
    /// the trailer. Returns `Err` on a malformed header, a deflate
    /// error, or a trailer mismatch.
    pub fn push(&mut self, mut input: &[u8]) -> Result<(), String> {
        if !self.header_parsed {
            let want = HEADER.len() - self.header_buf.len();
            let take = want.min(input.len());
            self.header_buf.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.header_buf.len() < HEADER.len() {
                return Ok(());
            }
            if self.header_buf[0] != HEADER[0] || self.header_buf[1] != HEADER[1] {
                return Err("bad gzip magic".to_string());
            }
            if self.header_buf[2] != 0x08 {
                return Err("unsupported gzip compression method".to_string());
            }
            if self.header_buf[3] != 0x00 {
                return Err("gzip header with optional fields not supported".to_string());
            }
            self.header_parsed = true;
        }

        if self.stream_ended {
            self.trailer_buf.extend_from_slice(input);
            return self.maybe_verify_trailer();
        }

        let mut scratch = [0u8; 8192];
        let mut offset = 0;
        while offset < input.len() {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(&input[offset..], &mut scratch, FlushDecompress::None)
                .map_err(|e| format!("deflate error: {e}"))?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;
            self.crc.update(&scratch[..produced]);
            self.out.extend(&scratch[..produced]);
            offset += consumed;

            if status == Status::StreamEnd {
                self.stream_ended = true;
                self.trailer_buf.extend_from_slice(&input[offset..]);
                return self.maybe_verify_trailer();
            }
            if consumed == 0 && produced == 0 {
                break;
            }
        }
        Ok(())
    }

    fn maybe_verify_trailer(&mut self) -> Result<(), String> {
        if self.trailer_buf.len() < TRAILER_LEN || self.verified {
            return Ok(());
        }
        let crc_expected = u32::from_le_bytes(self.trailer_buf[0..4].try_into().unwrap());
        let len_expected = u32::from_le_bytes(self.trailer_buf[4..8].try_into().unwrap());
        if crc_expected != self.crc.sum() {
            return Err("gzip CRC32 mismatch".to_string());
        }
        if len_expected != self.crc.amount() {
            return Err("gzip ISIZE mismatch".to_string());
        }
        self.verified = true;
        Ok(())
    }

    /// Drains up to `buf.len()` bytes of decompressed output.
    pub fn drain(&mut self, buf: &mut [u8]) -> usize {
        let n = self.out.len().min(buf.len());
        for (slot, byte) in buf[..n].iter_mut().zip(self.out.drain(..n)) {
            *slot = byte;
        }
        n
    }

    pub fn has_output(&self) -> bool {
        !self.out.is_empty()
    }

    /// True once inflate reached the end of the deflate stream and the
    /// trailer (if fully delivered) checked out.
    pub fn is_done(&self) -> bool {
        self.stream_ended && self.out.is_empty() && (self.trailer_buf.len() < TRAILER_LEN || self.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gzip_roundtrip(input: &[u8]) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.push(input);
        enc.finish();
        let mut compressed = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = enc.drain(&mut chunk);
            if n == 0 {
                break;
            }
            compressed.extend_from_slice(&chunk[..n]);
        }
        compressed
    }

    #[test]
    fn encode_then_decode_recovers_original_and_passes_trailer_check() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = gzip_roundtrip(&original);

        let mut dec = Decoder::new();
        dec.push(&compressed).unwrap();
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = dec.drain(&mut chunk);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, original);
        assert!(dec.is_done());
    }

    #[test]
    fn corrupted_trailer_is_rejected() {
        let compressed = gzip_roundtrip(b"hello world");
        let mut tampered = compressed;
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;

        let mut dec = Decoder::new();
        assert!(dec.push(&tampered).is_err());
    }
}
