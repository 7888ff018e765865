//! Pull-style byte sources handed to structural comparison
//!
//! A source is a cursor over a fixed byte range. It knows nothing about the
//! archive framing; callers pull raw container bytes through it.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use sealback_core::{SealbackError, SealbackResult};

pub trait ByteSource: Send + Sync {
    /// Up to `amount` bytes from the cursor. Short only at end-of-input.
    fn read(&self, amount: usize) -> impl Future<Output = SealbackResult<Bytes>> + Send;

    /// Move the cursor forward without touching the underlying resource.
    fn skip(&self, amount: u64);

    /// Total length of the underlying resource.
    fn size(&self) -> impl Future<Output = SealbackResult<u64>> + Send;

    /// Release the underlying resource. The source cannot be used afterwards.
    fn close(self) -> impl Future<Output = SealbackResult<()>> + Send
    where
        Self: Sized;
}

struct OpenFile {
    file: File,
    /// Reused across reads; sized to the largest request so far.
    scratch: Vec<u8>,
}

/// A file opened lazily, exactly once, on first `read` or `size`.
pub struct FileSource {
    path: PathBuf,
    handle: OnceCell<Mutex<OpenFile>>,
    position: AtomicU64,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: OnceCell::new(),
            position: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.handle.initialized()
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Concurrent first callers all wait on the same open.
    async fn handle(&self) -> SealbackResult<&Mutex<OpenFile>> {
        self.handle
            .get_or_try_init(|| async {
                let file = File::open(&self.path)
                    .await
                    .map_err(|source| SealbackError::Open {
                        path: self.path.clone(),
                        source,
                    })?;
                debug!(path = %self.path.display(), "byte source opened");
                Ok::<_, SealbackError>(Mutex::new(OpenFile {
                    file,
                    scratch: Vec::new(),
                }))
            })
            .await
    }
}

impl ByteSource for FileSource {
    async fn read(&self, amount: usize) -> SealbackResult<Bytes> {
        let handle = self.handle().await?;
        let mut open = handle.lock().await;
        let OpenFile { file, scratch } = &mut *open;

        if scratch.len() < amount {
            scratch.resize(amount, 0);
        }

        file.seek(SeekFrom::Start(self.position())).await?;
        let mut filled = 0;
        while filled < amount {
            let n = file.read(&mut scratch[filled..amount]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        self.position.fetch_add(filled as u64, Ordering::AcqRel);
        Ok(Bytes::copy_from_slice(&scratch[..filled]))
    }

    fn skip(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::AcqRel);
    }

    async fn size(&self) -> SealbackResult<u64> {
        let handle = self.handle().await?;
        let open = handle.lock().await;
        Ok(open.file.metadata().await?.len())
    }

    /// Waits out any operation still in flight on the handle and reports the
    /// error it left behind, if any.
    async fn close(self) -> SealbackResult<()> {
        let Some(handle) = self.handle.into_inner() else {
            debug!(path = %self.path.display(), "byte source closed before first use");
            return Ok(());
        };

        let mut open = handle.into_inner();
        open.file.flush().await.map_err(|source| SealbackError::Close {
            path: self.path.clone(),
            source,
        })?;
        drop(open.file.into_std().await);
        debug!(path = %self.path.display(), "byte source closed");
        Ok(())
    }
}

/// In-memory source, mostly for tests and for archives already in a buffer.
pub struct MemorySource {
    data: Bytes,
    position: AtomicU64,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: AtomicU64::new(0),
        }
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }
}

impl ByteSource for MemorySource {
    async fn read(&self, amount: usize) -> SealbackResult<Bytes> {
        let len = self.data.len() as u64;
        let start = self.position().min(len);
        let end = start.saturating_add(amount as u64).min(len);
        self.position.fetch_add(end - start, Ordering::AcqRel);
        Ok(self.data.slice(start as usize..end as usize))
    }

    fn skip(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::AcqRel);
    }

    async fn size(&self) -> SealbackResult<u64> {
        Ok(self.data.len() as u64)
    }

    async fn close(self) -> SealbackResult<()> {
        Ok(())
    }
}
