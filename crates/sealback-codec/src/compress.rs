//! Compression stages (gzip default, zstd alternate)
//!
//! Padding is appended after compression, so both decoders stop at the end of
//! the first gzip member / zstd frame and discard whatever follows.

use std::io::Write;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use zstd::stream::raw::{Decoder as ZstdRawDecoder, InBuffer, Operation, OutBuffer};

use sealback_core::{CompressionKind, SealbackError, SealbackResult};

use crate::stage::{Flush, Stage};

const ZSTD_SCRATCH: usize = 128 * 1024;

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

pub struct CompressStage {
    kind: CompressionKind,
    encoder: Option<Encoder>,
}

impl CompressStage {
    pub fn new(kind: CompressionKind, level: i32) -> SealbackResult<Self> {
        let (lo, hi) = kind.level_range();
        if !(lo..=hi).contains(&level) {
            return Err(SealbackError::Config(format!(
                "{kind:?} level {level} outside {lo}..={hi}"
            )));
        }

        let encoder = match kind {
            CompressionKind::Gzip => {
                Encoder::Gzip(GzEncoder::new(Vec::new(), Compression::new(level as u32)))
            }
            CompressionKind::Zstd => Encoder::Zstd(
                zstd::stream::write::Encoder::new(Vec::new(), level)
                    .map_err(|e| SealbackError::stage("compress", e.to_string()))?,
            ),
        };
        Ok(Self {
            kind,
            encoder: Some(encoder),
        })
    }

    pub fn kind(&self) -> CompressionKind {
        self.kind
    }
}

impl Stage for CompressStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        let fault = |e: std::io::Error| SealbackError::stage("compress", e.to_string());
        match self.encoder.as_mut() {
            Some(Encoder::Gzip(enc)) => {
                enc.write_all(chunk).map_err(fault)?;
                out.append(enc.get_mut());
            }
            Some(Encoder::Zstd(enc)) => {
                enc.write_all(chunk).map_err(fault)?;
                out.append(enc.get_mut());
            }
            None => return Err(SealbackError::stage("compress", "input after end-of-stream")),
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        let fault = |e: std::io::Error| SealbackError::stage("compress", e.to_string());
        match self.encoder.take() {
            Some(Encoder::Gzip(enc)) => out.extend(enc.finish().map_err(fault)?),
            Some(Encoder::Zstd(enc)) => out.extend(enc.finish().map_err(fault)?),
            None => {}
        }
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "compress"
    }
}

enum Decoder {
    Gzip(GzDecoder<Vec<u8>>),
    Zstd {
        raw: ZstdRawDecoder<'static>,
        scratch: Vec<u8>,
    },
}

pub struct DecompressStage {
    kind: CompressionKind,
    decoder: Option<Decoder>,
    /// Set once the member/frame is complete; later input is padding.
    ended: bool,
    consumed: u64,
}

impl DecompressStage {
    pub fn new(kind: CompressionKind) -> SealbackResult<Self> {
        let decoder = match kind {
            CompressionKind::Gzip => Decoder::Gzip(GzDecoder::new(Vec::new())),
            CompressionKind::Zstd => Decoder::Zstd {
                raw: ZstdRawDecoder::new()
                    .map_err(|e| SealbackError::stage("decompress", e.to_string()))?,
                scratch: vec![0u8; ZSTD_SCRATCH],
            },
        };
        Ok(Self {
            kind,
            decoder: Some(decoder),
            ended: false,
            consumed: 0,
        })
    }

    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    /// Compressed bytes accepted before the end of the member/frame.
    pub fn compressed_len(&self) -> u64 {
        self.consumed
    }

    pub fn reached_end(&self) -> bool {
        self.ended
    }
}

impl Stage for DecompressStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        if self.ended {
            return Ok(());
        }
        let corrupt = |e: std::io::Error| SealbackError::malformed(format!("decompress: {e}"));

        match self.decoder.as_mut() {
            Some(Decoder::Gzip(dec)) => {
                let mut rest = chunk;
                while !rest.is_empty() {
                    let n = dec.write(rest).map_err(corrupt)?;
                    if n == 0 {
                        self.ended = true;
                        break;
                    }
                    self.consumed += n as u64;
                    rest = &rest[n..];
                }
                out.append(dec.get_mut());
            }
            Some(Decoder::Zstd { raw, scratch }) => {
                let mut input = InBuffer::around(chunk);
                loop {
                    let before = input.pos;
                    let (hint, produced) = {
                        let mut output = OutBuffer::around(scratch.as_mut_slice());
                        let hint = raw.run(&mut input, &mut output).map_err(corrupt)?;
                        (hint, output.pos())
                    };
                    out.extend_from_slice(&scratch[..produced]);
                    self.consumed += (input.pos - before) as u64;

                    if hint == 0 {
                        self.ended = true;
                        break;
                    }
                    if input.pos == chunk.len() && produced < scratch.len() {
                        break;
                    }
                }
            }
            None => return Err(SealbackError::stage("decompress", "input after end-of-stream")),
        }
        if self.ended {
            tracing::debug!(
                kind = ?self.kind,
                compressed_bytes = self.consumed,
                "compressed stream complete, ignoring trailing padding"
            );
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        match self.decoder.take() {
            Some(Decoder::Gzip(mut dec)) => {
                dec.try_finish().map_err(|e| {
                    SealbackError::malformed(format!("gzip member truncated or corrupt: {e}"))
                })?;
                out.append(dec.get_mut());
            }
            Some(Decoder::Zstd { .. }) => {
                if !self.ended {
                    return Err(SealbackError::malformed("zstd frame truncated"));
                }
            }
            None => {}
        }
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "decompress"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::padding::PaddingStage;
    use crate::stage::Pipeline;
    use proptest::prelude::*;
    use sealback_core::ErrorKind;

    fn compress(kind: CompressionKind, data: &[u8], pad: bool) -> Vec<u8> {
        let mut pipeline =
            Pipeline::new().with_stage(CompressStage::new(kind, kind.default_level()).unwrap());
        if pad {
            pipeline = pipeline.with_stage(PaddingStage::new(64));
        }
        let mut out = Vec::new();
        for piece in data.chunks(1000) {
            out.extend(pipeline.push(piece).unwrap());
        }
        out.extend(pipeline.finish_all().unwrap());
        out
    }

    fn decompress(kind: CompressionKind, data: &[u8], chunk: usize) -> SealbackResult<Vec<u8>> {
        let mut stage = DecompressStage::new(kind)?;
        let mut out = Vec::new();
        for piece in data.chunks(chunk.max(1)) {
            stage.feed(piece, &mut out)?;
        }
        stage.finish(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_gzip_ignores_trailing_padding() {
        let data = b"records records records records".repeat(20);
        let padded = compress(CompressionKind::Gzip, &data, true);
        assert_eq!(padded.len() as u64, crate::padding::bucket_for(padded.len() as u64));
        assert_eq!(decompress(CompressionKind::Gzip, &padded, 17).unwrap(), data);
    }

    #[test]
    fn test_zstd_ignores_trailing_padding() {
        let data = b"zstd frame then zeros".repeat(50);
        let padded = compress(CompressionKind::Zstd, &data, true);
        assert_eq!(decompress(CompressionKind::Zstd, &padded, 33).unwrap(), data);
    }

    #[test]
    fn test_empty_input_roundtrips() {
        for kind in [CompressionKind::Gzip, CompressionKind::Zstd] {
            let padded = compress(kind, b"", true);
            assert_eq!(padded.len(), 541);
            assert!(decompress(kind, &padded, 64).unwrap().is_empty());
        }
    }

    #[test]
    fn test_truncated_streams_are_malformed() {
        let data: Vec<u8> = (0..5000u32).flat_map(|i| i.to_le_bytes()).collect();
        for kind in [CompressionKind::Gzip, CompressionKind::Zstd] {
            let full = compress(kind, &data, false);
            let err = decompress(kind, &full[..full.len() / 2], 100).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput, "{kind:?}");
        }
    }

    #[test]
    fn test_level_out_of_range() {
        assert!(CompressStage::new(CompressionKind::Gzip, 10).is_err());
        assert!(CompressStage::new(CompressionKind::Zstd, 0).is_err());
    }

    #[test]
    fn test_zstd_output_larger_than_scratch() {
        let data = vec![7u8; 3 * ZSTD_SCRATCH + 11];
        let packed = compress(CompressionKind::Zstd, &data, true);
        assert!(packed.len() < 4096);
        assert_eq!(decompress(CompressionKind::Zstd, &packed, 4096).unwrap(), data);
    }

    proptest! {
        #[test]
        fn gzip_any_chunking(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..300,
        ) {
            let padded = compress(CompressionKind::Gzip, &data, true);
            prop_assert_eq!(decompress(CompressionKind::Gzip, &padded, chunk).unwrap(), data);
        }
    }
}
