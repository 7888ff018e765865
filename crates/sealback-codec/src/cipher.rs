//! Block-cipher stages. Encode runs with a known IV; decode reads the IV off
//! the front of its own input.

use std::sync::Arc;

use zeroize::Zeroize;

use sealback_core::{SealbackError, SealbackResult};
use sealback_crypto::{CipherEngine, CipherSuite};

use crate::stage::{Flush, Stage};

pub struct CipherEncodeStage {
    engine: Option<Box<dyn CipherEngine>>,
}

impl CipherEncodeStage {
    pub fn new(suite: &dyn CipherSuite, key: &[u8], iv: &[u8]) -> SealbackResult<Self> {
        Ok(Self {
            engine: Some(suite.encryptor(key, iv)?),
        })
    }
}

impl Stage for CipherEncodeStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        match self.engine.as_mut() {
            Some(engine) => engine.update(chunk, out),
            None => Err(SealbackError::stage("cipher-encode", "input after end-of-stream")),
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        if let Some(engine) = self.engine.take() {
            engine.finish(out)?;
        }
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "cipher-encode"
    }
}

/// Decrypts `[IV][ciphertext]`. Nothing comes out until the IV is complete.
pub struct CipherDecodeStage {
    suite: Arc<dyn CipherSuite>,
    key: Vec<u8>,
    iv_buf: Vec<u8>,
    engine: Option<Box<dyn CipherEngine>>,
    finished: bool,
}

impl CipherDecodeStage {
    pub fn new(suite: Arc<dyn CipherSuite>, key: &[u8]) -> SealbackResult<Self> {
        if key.len() != suite.key_len() {
            return Err(SealbackError::KeyLength {
                what: "cipher key",
                expected: suite.key_len(),
                actual: key.len(),
            });
        }
        let iv_len = suite.iv_len();
        Ok(Self {
            suite,
            key: key.to_vec(),
            iv_buf: Vec::with_capacity(iv_len),
            engine: None,
            finished: false,
        })
    }

    /// The IV read off the stream, once enough bytes have arrived.
    pub fn iv(&self) -> Option<&[u8]> {
        self.engine.as_ref().map(|_| self.iv_buf.as_slice())
    }
}

impl Stage for CipherDecodeStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        if self.finished {
            return Err(SealbackError::stage(self.name(), "input after end-of-stream"));
        }
        if let Some(engine) = self.engine.as_mut() {
            return engine.update(chunk, out);
        }

        let iv_len = self.suite.iv_len();
        let take = (iv_len - self.iv_buf.len()).min(chunk.len());
        self.iv_buf.extend_from_slice(&chunk[..take]);
        if self.iv_buf.len() < iv_len {
            return Ok(());
        }

        let mut engine = self.suite.decryptor(&self.key, &self.iv_buf)?;
        engine.update(&chunk[take..], out)?;
        self.engine = Some(engine);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        if self.finished {
            return Ok(Flush::Done);
        }
        self.finished = true;

        match self.engine.take() {
            Some(engine) => engine.finish(out)?,
            None => {
                return Err(SealbackError::malformed(format!(
                    "stream ended after {} bytes, before a {}-byte IV",
                    self.iv_buf.len(),
                    self.suite.iv_len()
                )))
            }
        }
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "cipher-decode"
    }
}

impl Drop for CipherDecodeStage {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::PrefixStage;
    use crate::stage::Pipeline;
    use proptest::prelude::*;
    use sealback_core::ErrorKind;
    use sealback_crypto::Aes256CbcHmacSha256;

    const KEY: [u8; 32] = [0x33; 32];
    const IV: [u8; 16] = [0x44; 16];

    fn encode(plaintext: &[u8]) -> Vec<u8> {
        let mut pipeline = Pipeline::new()
            .with_stage(CipherEncodeStage::new(&Aes256CbcHmacSha256, &KEY, &IV).unwrap())
            .with_stage(PrefixStage::new(IV));
        let mut out = pipeline.push(plaintext).unwrap();
        out.extend(pipeline.finish_all().unwrap());
        out
    }

    fn decode(container: &[u8], chunk: usize) -> SealbackResult<Vec<u8>> {
        let mut stage = CipherDecodeStage::new(Arc::new(Aes256CbcHmacSha256), &KEY)?;
        let mut out = Vec::new();
        for piece in container.chunks(chunk.max(1)) {
            stage.feed(piece, &mut out)?;
        }
        stage.finish(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_iv_is_prefixed_and_recovered() {
        let container = encode(&[9u8; 32]);
        assert_eq!(&container[..16], &IV);
        assert_eq!(container.len(), 16 + 48);

        let mut stage = CipherDecodeStage::new(Arc::new(Aes256CbcHmacSha256), &KEY).unwrap();
        let mut out = Vec::new();
        stage.feed(&container[..10], &mut out).unwrap();
        assert!(stage.iv().is_none());
        assert!(out.is_empty(), "nothing decrypts before the IV is known");
        stage.feed(&container[10..], &mut out).unwrap();
        assert_eq!(stage.iv(), Some(&IV[..]));
    }

    #[test]
    fn test_stream_shorter_than_iv_is_malformed() {
        let err = decode(&[0u8; 15], 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_iv_only_stream_is_malformed() {
        let err = decode(&IV, 16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_misaligned_ciphertext_is_malformed() {
        let mut container = encode(b"sixteen byte msg");
        container.pop();
        let err = decode(&container, 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_wrong_key_length_rejected_up_front() {
        let err = CipherDecodeStage::new(Arc::new(Aes256CbcHmacSha256), &[0u8; 31])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Construction);
    }

    proptest! {
        #[test]
        fn block_multiple_roundtrip(
            blocks in 0usize..64,
            fill in any::<u8>(),
            chunk in 1usize..70,
        ) {
            let plaintext = vec![fill; blocks * 16];
            prop_assert_eq!(decode(&encode(&plaintext), chunk).unwrap(), plaintext);
        }
    }
}
