//! Export: records → compress → pad → encrypt → IV prefix → MAC tag

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, info};

use sealback_codec::{
    encode_frame, ArchiveHeader, CipherEncodeStage, CompressStage, MacAppendStage, PaddingStage,
    Pipeline, PrefixStage,
};
use sealback_core::{ArchiveConfig, SealbackError, SealbackResult};
use sealback_crypto::{CipherSuite, IvLedger, KeyMaterial, IV_SIZE};

/// What one export produced.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Container length in bytes
    pub total_bytes: u64,
    pub iv: Vec<u8>,
    /// Tag appended to the container
    pub mac: Vec<u8>,
    /// Payload frames written (header excluded)
    pub frames: u64,
    pub duration: Duration,
}

/// Seals record streams under one key pair. Every export draws a fresh IV
/// that this builder has never used before.
#[derive(Debug)]
pub struct ArchiveBuilder {
    suite: Arc<dyn CipherSuite>,
    keys: KeyMaterial,
    config: ArchiveConfig,
    ivs: IvLedger,
}

impl ArchiveBuilder {
    pub fn new(
        suite: Arc<dyn CipherSuite>,
        keys: KeyMaterial,
        config: &ArchiveConfig,
    ) -> SealbackResult<Self> {
        config.validate()?;
        crate::check_key_lengths(suite.as_ref(), &keys)?;
        if suite.iv_len() != IV_SIZE {
            return Err(SealbackError::KeyLength {
                what: "iv",
                expected: IV_SIZE,
                actual: suite.iv_len(),
            });
        }
        Ok(Self {
            suite,
            keys,
            config: config.clone(),
            ivs: IvLedger::new(),
        })
    }

    /// Number of exports this builder has sealed.
    pub fn exports_issued(&self) -> usize {
        self.ivs.issued_count()
    }

    /// Readers built from the same config refuse frames over `max_frame_len`,
    /// so the builder refuses to write them.
    fn check_frame_len(&self, what: &str, len: usize) -> SealbackResult<()> {
        if len > self.config.max_frame_len {
            return Err(SealbackError::stage(
                "frame-encode",
                format!(
                    "{what} frame of {len} bytes exceeds limit of {}",
                    self.config.max_frame_len
                ),
            ));
        }
        Ok(())
    }

    fn pipeline(&self, iv: &[u8], tag_tx: oneshot::Sender<Vec<u8>>) -> SealbackResult<Pipeline> {
        let suite = self.suite.as_ref();
        let mac = MacAppendStage::new(suite, self.keys.mac_key())?.with_observer(move |tag| {
            let _ = tag_tx.send(tag.to_vec());
        });

        let pipeline = Pipeline::new()
            .with_stage(CompressStage::new(self.config.compression, self.config.level())?)
            .with_stage(PaddingStage::new(self.config.padding_chunk_size))
            .with_stage(CipherEncodeStage::new(suite, self.keys.cipher_key(), iv)?)
            .with_stage(PrefixStage::new(iv))
            .with_stage(mac);
        debug!(stages = ?pipeline.stage_names(), "export pipeline built");
        Ok(pipeline)
    }

    /// Stream `header` and `frames` into `sink` as one sealed container.
    ///
    /// The sink is awaited after every piece, so a slow writer holds the
    /// pipeline (padding included) where it is.
    pub async fn export<I, W>(
        &self,
        header: &ArchiveHeader,
        frames: I,
        sink: &mut W,
    ) -> SealbackResult<ExportSummary>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        self.check_frame_len("header", header.body_len())?;
        let iv = self.ivs.issue();
        let (tag_tx, mut tag_rx) = oneshot::channel();
        let mut pipeline = self.pipeline(&iv, tag_tx)?;

        let mut batch = header.to_frame()?;
        let mut count = 0u64;
        let mut total = 0u64;

        for frame in frames {
            let frame = frame.as_ref();
            self.check_frame_len("record", frame.len())?;
            encode_frame(frame, &mut batch)?;
            count += 1;
            if batch.len() >= self.config.chunk_size {
                let out = pipeline.push(&batch)?;
                batch.clear();
                sink.write_all(&out).await?;
                total += out.len() as u64;
            }
        }
        if !batch.is_empty() {
            let out = pipeline.push(&batch)?;
            sink.write_all(&out).await?;
            total += out.len() as u64;
        }

        while let Some(piece) = pipeline.finish_next()? {
            sink.write_all(&piece).await?;
            total += piece.len() as u64;
        }
        sink.flush().await?;

        let mac = tag_rx
            .try_recv()
            .map_err(|_| SealbackError::stage("mac-append", "tag was never reported"))?;

        let summary = ExportSummary {
            total_bytes: total,
            iv: iv.to_vec(),
            mac,
            frames: count,
            duration: started.elapsed(),
        };
        info!(
            bytes = summary.total_bytes,
            frames = summary.frames,
            compression = ?self.config.compression,
            tag_len = summary.mac.len(),
            elapsed_ms = summary.duration.as_millis() as u64,
            "archive exported"
        );
        Ok(summary)
    }

    pub async fn export_to_vec<I>(
        &self,
        header: &ArchiveHeader,
        frames: I,
    ) -> SealbackResult<(Vec<u8>, ExportSummary)>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut out = Vec::new();
        let summary = self.export(header, frames, &mut out).await?;
        Ok((out, summary))
    }

    /// Export to a new file at `path`, synced to disk before returning.
    pub async fn export_to_file<I>(
        &self,
        header: &ArchiveHeader,
        frames: I,
        path: &Path,
    ) -> SealbackResult<ExportSummary>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| SealbackError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let summary = self.export(header, frames, &mut file).await?;
        file.sync_all().await?;
        debug!(path = %path.display(), bytes = summary.total_bytes, "archive written");
        Ok(summary)
    }
}
