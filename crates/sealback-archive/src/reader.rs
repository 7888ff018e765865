//! Import: authenticate a container, then decrypt and unpack it
//!
//! Import reads the container twice. The first pass only recomputes the MAC,
//! so a tampered or mis-keyed archive is rejected before anything is
//! decrypted. The second pass decrypts, decompresses and splits frames, and
//! checks the tag again at the end in case the bytes changed in between.
//! Records are handed out only after both checks pass.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use sealback_codec::{
    ArchiveHeader, CipherDecodeStage, DecompressStage, FrameDecoder, MacVerifyStage, Pipeline,
    Stage, TagCheck,
};
use sealback_core::{ArchiveConfig, CompressionKind, SealbackError, SealbackResult};
use sealback_crypto::{constant_time_eq, CipherSuite, KeyMaterial};

use crate::ProgressFn;

/// A fully authenticated archive.
#[derive(Debug, Clone)]
pub struct ImportedArchive {
    pub header: ArchiveHeader,
    /// Payload frames, header excluded, in archive order.
    pub records: Vec<Bytes>,
    /// Container length in bytes.
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ArchiveReader {
    suite: Arc<dyn CipherSuite>,
    keys: KeyMaterial,
    compression: CompressionKind,
    chunk_size: usize,
    max_frame_len: usize,
}

impl ArchiveReader {
    pub fn new(
        suite: Arc<dyn CipherSuite>,
        keys: KeyMaterial,
        config: &ArchiveConfig,
    ) -> SealbackResult<Self> {
        config.validate()?;
        crate::check_key_lengths(suite.as_ref(), &keys)?;
        Ok(Self {
            suite,
            keys,
            compression: config.compression,
            chunk_size: config.chunk_size,
            max_frame_len: config.max_frame_len,
        })
    }

    /// Smallest well-formed container: IV, one cipher block, tag.
    pub fn min_container_len(&self) -> u64 {
        (self.suite.iv_len() + self.suite.block_len() + self.suite.tag_len()) as u64
    }

    pub fn compression(&self) -> CompressionKind {
        self.compression
    }

    /// Two-pass import. `open` is called once per pass and must yield the
    /// same bytes both times.
    pub async fn import_from<F, Fut, R>(
        &self,
        mut open: F,
        progress: Option<&ProgressFn>,
    ) -> SealbackResult<ImportedArchive>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SealbackResult<R>>,
        R: AsyncRead + Unpin,
    {
        let started = Instant::now();

        let mut mac_pass = MacPass::new(self)?;
        let mut input = open().await?;
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            mac_pass.feed(&buf[..n])?;
        }
        drop(input);
        let total = mac_pass.finish(self)?;
        debug!(bytes = total, "archive authenticated, decoding");

        let mut decode = DecodePass::new(self)?;
        let mut input = open().await?;
        let mut done = 0u64;
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            decode.feed(&buf[..n])?;
            done += n as u64;
            if let Some(cb) = progress {
                cb(done, total, "decoding");
            }
        }
        if done != total {
            return Err(SealbackError::malformed(format!(
                "archive changed between passes: {total} bytes, then {done}"
            )));
        }
        let archive = decode.finish(total)?;

        info!(
            bytes = total,
            records = archive.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "archive imported"
        );
        Ok(archive)
    }

    pub async fn import_file(
        &self,
        path: &Path,
        progress: Option<&ProgressFn>,
    ) -> SealbackResult<ImportedArchive> {
        self.import_from(
            || async move {
                tokio::fs::File::open(path)
                    .await
                    .map_err(|source| SealbackError::Open {
                        path: path.to_path_buf(),
                        source,
                    })
            },
            progress,
        )
        .await
    }

    /// The same two passes over a buffer.
    pub fn decode_bytes(&self, data: &[u8]) -> SealbackResult<ImportedArchive> {
        let mut mac_pass = MacPass::new(self)?;
        for chunk in data.chunks(self.chunk_size) {
            mac_pass.feed(chunk)?;
        }
        let total = mac_pass.finish(self)?;

        let mut decode = DecodePass::new(self)?;
        for chunk in data.chunks(self.chunk_size) {
            decode.feed(chunk)?;
        }
        decode.finish(total)
    }

    fn authenticate(&self, check: TagCheck, total: u64) -> SealbackResult<()> {
        if total < self.min_container_len() || !check.claimed_is_complete() {
            return Err(SealbackError::malformed(format!(
                "container of {total} bytes is shorter than the {}-byte minimum",
                self.min_container_len()
            )));
        }
        if !constant_time_eq(&check.computed, &check.claimed) {
            warn!(bytes = total, tag_len = check.claimed.len(), "archive tag mismatch");
            return Err(SealbackError::Authentication(
                "archive tag does not match its contents".into(),
            ));
        }
        Ok(())
    }
}

/// First pass: MAC only, output discarded.
struct MacPass {
    verify: MacVerifyStage,
    total: u64,
    sink: Vec<u8>,
}

impl MacPass {
    fn new(reader: &ArchiveReader) -> SealbackResult<Self> {
        Ok(Self {
            verify: MacVerifyStage::new(reader.suite.as_ref(), reader.keys.mac_key())?,
            total: 0,
            sink: Vec::new(),
        })
    }

    fn feed(&mut self, chunk: &[u8]) -> SealbackResult<()> {
        self.total += chunk.len() as u64;
        self.verify.feed(chunk, &mut self.sink)?;
        self.sink.clear();
        Ok(())
    }

    fn finish(mut self, reader: &ArchiveReader) -> SealbackResult<u64> {
        self.verify.finish(&mut self.sink)?;
        let check = self
            .verify
            .take_verdict()
            .ok_or_else(|| SealbackError::stage("mac-verify", "no verdict after finish"))?;
        reader.authenticate(check, self.total)?;
        Ok(self.total)
    }
}

/// Second pass: verify → decrypt → decompress → frames.
struct DecodePass<'a> {
    reader: &'a ArchiveReader,
    verify: MacVerifyStage,
    inner: Pipeline,
    frames: FrameDecoder,
    decoded: Vec<Bytes>,
}

impl<'a> DecodePass<'a> {
    fn new(reader: &'a ArchiveReader) -> SealbackResult<Self> {
        let inner = Pipeline::new()
            .with_stage(CipherDecodeStage::new(
                Arc::clone(&reader.suite),
                reader.keys.cipher_key(),
            )?)
            .with_stage(DecompressStage::new(reader.compression)?);
        Ok(Self {
            reader,
            verify: MacVerifyStage::new(reader.suite.as_ref(), reader.keys.mac_key())?,
            inner,
            frames: FrameDecoder::new(reader.max_frame_len),
            decoded: Vec::new(),
        })
    }

    fn feed(&mut self, chunk: &[u8]) -> SealbackResult<()> {
        let mut authed = Vec::with_capacity(chunk.len());
        self.verify.feed(chunk, &mut authed)?;
        let plain = self.inner.push(&authed)?;
        self.decoded.extend(self.frames.feed(&plain)?);
        Ok(())
    }

    fn finish(mut self, total: u64) -> SealbackResult<ImportedArchive> {
        self.verify.finish(&mut Vec::new())?;
        while let Some(plain) = self.inner.finish_next()? {
            self.decoded.extend(self.frames.feed(&plain)?);
        }
        self.frames.finish()?;

        let check = self
            .verify
            .take_verdict()
            .ok_or_else(|| SealbackError::stage("mac-verify", "no verdict after finish"))?;
        self.reader.authenticate(check, total)?;

        let mut frames = self.decoded.into_iter();
        let header_frame = frames
            .next()
            .ok_or_else(|| SealbackError::malformed("archive has no header frame"))?;
        let header = ArchiveHeader::from_frame(&header_frame)?;

        Ok(ImportedArchive {
            header,
            records: frames.collect(),
            total_bytes: total,
        })
    }
}
