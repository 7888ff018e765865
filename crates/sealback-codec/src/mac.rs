//! Encrypt-then-MAC stages: append a tag on export, split it off on import

use sealback_core::{SealbackError, SealbackResult};
use sealback_crypto::{CipherSuite, MacEngine};

use crate::stage::{Flush, Stage};

/// Receives the finished tag without touching the byte stream.
pub type TagObserver = Box<dyn FnOnce(&[u8]) + Send>;

/// Passes bytes through while MACing them, then appends the tag.
pub struct MacAppendStage {
    mac: Option<Box<dyn MacEngine>>,
    observer: Option<TagObserver>,
}

impl MacAppendStage {
    /// Fails right away if `mac_key` has the wrong length for `suite`.
    pub fn new(suite: &dyn CipherSuite, mac_key: &[u8]) -> SealbackResult<Self> {
        Ok(Self {
            mac: Some(suite.mac(mac_key)?),
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: impl FnOnce(&[u8]) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }
}

impl Stage for MacAppendStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        let mac = self
            .mac
            .as_mut()
            .ok_or_else(|| SealbackError::stage("mac-append", "input after end-of-stream"))?;
        mac.update(chunk);
        out.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        if let Some(mac) = self.mac.take() {
            let tag = mac.finalize();
            if let Some(observer) = self.observer.take() {
                observer(&tag);
            }
            out.extend_from_slice(&tag);
        }
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "mac-append"
    }
}

/// What the verify stage found at end-of-stream. Comparing the two is the
/// caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCheck {
    /// Tag recomputed over everything before the trailing window.
    pub computed: Vec<u8>,
    /// The trailing bytes, normally exactly one tag long. Shorter means the
    /// stream was too short to carry a tag.
    pub claimed: Vec<u8>,
}

impl TagCheck {
    pub fn claimed_is_complete(&self) -> bool {
        self.claimed.len() == self.computed.len()
    }
}

/// Forwards everything except the last `tag_len` bytes, which it holds back
/// as the claimed tag.
pub struct MacVerifyStage {
    mac: Option<Box<dyn MacEngine>>,
    tag_len: usize,
    window: Vec<u8>,
    authenticated: u64,
    verdict: Option<TagCheck>,
}

impl MacVerifyStage {
    pub fn new(suite: &dyn CipherSuite, mac_key: &[u8]) -> SealbackResult<Self> {
        let tag_len = suite.tag_len();
        Ok(Self {
            mac: Some(suite.mac(mac_key)?),
            tag_len,
            window: Vec::with_capacity(2 * tag_len),
            authenticated: 0,
            verdict: None,
        })
    }

    /// Bytes forwarded (and MACed) so far.
    pub fn bytes_authenticated(&self) -> u64 {
        self.authenticated
    }

    pub fn verdict(&self) -> Option<&TagCheck> {
        self.verdict.as_ref()
    }

    pub fn take_verdict(&mut self) -> Option<TagCheck> {
        self.verdict.take()
    }
}

impl Stage for MacVerifyStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        let mac = self
            .mac
            .as_mut()
            .ok_or_else(|| SealbackError::stage("mac-verify", "input after end-of-stream"))?;

        self.window.extend_from_slice(chunk);
        if self.window.len() > self.tag_len {
            let excess = self.window.len() - self.tag_len;
            mac.update(&self.window[..excess]);
            out.extend_from_slice(&self.window[..excess]);
            self.window.drain(..excess);
            self.authenticated += excess as u64;
        }
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> SealbackResult<Flush> {
        if let Some(mac) = self.mac.take() {
            self.verdict = Some(TagCheck {
                computed: mac.finalize(),
                claimed: std::mem::take(&mut self.window),
            });
        }
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "mac-verify"
    }
}
