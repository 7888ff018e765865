//! Record framing: varint length-delimited frames, the first of which is the
//! archive header message

use bytes::{Bytes, BytesMut};
use prost::Message;

use sealback_core::{SealbackError, SealbackResult};

/// Archive format version written into, and required from, the header.
pub const FORMAT_VERSION: u64 = 1;

/// A u64 varint never needs more than 10 bytes.
const MAX_VARINT_LEN: usize = 10;

/// Length of a present media root key.
pub const MEDIA_ROOT_KEY_LEN: usize = 32;

/// First frame of every archive.
#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct ArchiveHeader {
    #[prost(uint64, tag = "1")]
    pub version: u64,
    #[prost(uint64, tag = "2")]
    pub created_at_ms: u64,
    /// Root key for attachment media. Empty when the archive carries none.
    #[prost(bytes = "vec", tag = "3")]
    pub media_root_key: Vec<u8>,
}

impl ArchiveHeader {
    pub fn new(created_at_ms: u64, media_root_key: Vec<u8>) -> Self {
        Self {
            version: FORMAT_VERSION,
            created_at_ms,
            media_root_key,
        }
    }

    pub fn validate(&self) -> SealbackResult<()> {
        if self.version != FORMAT_VERSION {
            return Err(SealbackError::malformed(format!(
                "unsupported archive version {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }
        if !self.media_root_key.is_empty() && self.media_root_key.len() != MEDIA_ROOT_KEY_LEN {
            return Err(SealbackError::malformed(format!(
                "media root key must be empty or {MEDIA_ROOT_KEY_LEN} bytes, got {}",
                self.media_root_key.len()
            )));
        }
        Ok(())
    }

    /// Encoded message length, without the frame's length prefix.
    pub fn body_len(&self) -> usize {
        self.encoded_len()
    }

    pub fn to_frame(&self) -> SealbackResult<Vec<u8>> {
        self.validate()?;
        let mut out = Vec::with_capacity(self.encoded_len() + MAX_VARINT_LEN);
        encode_frame(&self.encode_to_vec(), &mut out)?;
        Ok(out)
    }

    /// Parse and validate a header from a frame body (length prefix removed).
    pub fn from_frame(body: &[u8]) -> SealbackResult<Self> {
        let header = Self::decode(body)
            .map_err(|e| SealbackError::malformed(format!("archive header: {e}")))?;
        header.validate()?;
        Ok(header)
    }
}

impl std::fmt::Debug for ArchiveHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHeader")
            .field("version", &self.version)
            .field("created_at_ms", &self.created_at_ms)
            .field(
                "media_root_key",
                &if self.media_root_key.is_empty() {
                    "<none>"
                } else {
                    "[REDACTED]"
                },
            )
            .finish()
    }
}

/// Append `body` to `out` behind its varint length.
pub fn encode_frame(body: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
    prost::encode_length_delimiter(body.len(), out)
        .map_err(|e| SealbackError::stage("frame-encode", e.to_string()))?;
    out.extend_from_slice(body);
    Ok(())
}

/// Streaming splitter for length-delimited frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_len: usize,
    frames: u64,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_len,
            frames: 0,
        }
    }

    /// Frames decoded so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Append `chunk` and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> SealbackResult<Vec<Bytes>> {
        self.buf.extend_from_slice(chunk);

        let mut ready = Vec::new();
        while let Some((prefix_len, body_len)) = self.next_prefix()? {
            if self.buf.len() < prefix_len + body_len {
                break;
            }
            let _ = self.buf.split_to(prefix_len);
            ready.push(self.buf.split_to(body_len).freeze());
            self.frames += 1;
        }
        Ok(ready)
    }

    /// End of input: anything still buffered is a cut-off frame.
    pub fn finish(&mut self) -> SealbackResult<()> {
        if !self.buf.is_empty() {
            return Err(SealbackError::malformed(format!(
                "{} trailing bytes do not form a complete frame",
                self.buf.len()
            )));
        }
        Ok(())
    }

    fn next_prefix(&self) -> SealbackResult<Option<(usize, usize)>> {
        let scan = &self.buf[..self.buf.len().min(MAX_VARINT_LEN)];
        let Some(last) = scan.iter().position(|b| b & 0x80 == 0) else {
            if scan.len() == MAX_VARINT_LEN {
                return Err(SealbackError::malformed("frame length prefix exceeds 10 bytes"));
            }
            return Ok(None);
        };

        let prefix_len = last + 1;
        let body_len = prost::decode_length_delimiter(&scan[..prefix_len])
            .map_err(|e| SealbackError::malformed(format!("frame length prefix: {e}")))?;
        if body_len > self.max_frame_len {
            return Err(SealbackError::malformed(format!(
                "frame of {body_len} bytes exceeds limit of {}",
                self.max_frame_len
            )));
        }
        Ok(Some((prefix_len, body_len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sealback_core::ErrorKind;

    fn framed(bodies: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for body in bodies {
            encode_frame(body, &mut out).unwrap();
        }
        out
    }

    #[test]
    fn test_header_roundtrip_through_frame() {
        let header = ArchiveHeader::new(1_700_000_000_000, vec![7u8; 32]);
        let frame = header.to_frame().unwrap();

        let mut decoder = FrameDecoder::new(1024);
        let frames = decoder.feed(&frame).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), header.body_len());
        assert_eq!(ArchiveHeader::from_frame(&frames[0]).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_bad_version_and_key() {
        let mut header = ArchiveHeader::new(0, Vec::new());
        header.version = 2;
        assert_eq!(header.validate().unwrap_err().kind(), ErrorKind::MalformedInput);

        let header = ArchiveHeader::new(0, vec![1u8; 16]);
        assert!(header.to_frame().is_err());
    }

    #[test]
    fn test_header_debug_hides_key() {
        let header = ArchiveHeader::new(5, vec![0xEE; 32]);
        let debug = format!("{header:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("238"));
    }

    #[test]
    fn test_empty_frames_are_kept() {
        let data = framed(&[&b""[..], &b"a"[..], &b""[..]]);
        let mut decoder = FrameDecoder::new(16);
        let frames = decoder.feed(&data).unwrap();
        assert_eq!(frames, vec![Bytes::new(), Bytes::from_static(b"a"), Bytes::new()]);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_partial_frame_at_end_is_malformed() {
        let data = framed(&[&b"complete"[..], &b"cut off here"[..]]);
        let mut decoder = FrameDecoder::new(1024);
        let frames = decoder.feed(&data[..data.len() - 4]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.finish().unwrap_err().kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let data = framed(&[&[0u8; 100][..]]);
        let mut decoder = FrameDecoder::new(99);
        assert!(decoder.feed(&data).is_err());
    }

    #[test]
    fn test_overlong_prefix_rejected() {
        let mut decoder = FrameDecoder::new(usize::MAX);
        assert!(decoder.feed(&[0xFF; 9]).unwrap().is_empty());
        assert!(decoder.feed(&[0xFF]).is_err());
    }

    proptest! {
        #[test]
        fn frames_survive_any_chunking(
            bodies in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..300), 0..20),
            chunk in 1usize..64,
        ) {
            let refs: Vec<&[u8]> = bodies.iter().map(Vec::as_slice).collect();
            let data = framed(&refs);

            let mut decoder = FrameDecoder::new(1 << 20);
            let mut got = Vec::new();
            for piece in data.chunks(chunk) {
                got.extend(decoder.feed(piece).unwrap());
            }
            decoder.finish().unwrap();

            let got: Vec<Vec<u8>> = got.iter().map(|b| b.to_vec()).collect();
            prop_assert_eq!(got, bodies);
        }
    }
}
