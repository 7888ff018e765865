//! Capability traits the codec stages are written against

use sealback_core::SealbackResult;

use crate::aes_cbc::{CbcDecryptor, CbcEncryptor};
use crate::mac::HmacSha256Engine;
use crate::{BLOCK_SIZE, IV_SIZE, KEY_SIZE, MAC_KEY_SIZE, MAC_SIZE};

/// A streaming block cipher context, one direction only.
pub trait CipherEngine: Send {
    /// Process `input`, appending whatever whole blocks are ready to `out`.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> SealbackResult<()>;

    /// Flush the final block. Fails if the accumulated input cannot form a
    /// valid final block.
    fn finish(self: Box<Self>, out: &mut Vec<u8>) -> SealbackResult<()>;
}

/// A running keyed-hash accumulator.
pub trait MacEngine: Send {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Factory for matched cipher and MAC engines.
pub trait CipherSuite: Send + Sync + std::fmt::Debug {
    fn key_len(&self) -> usize;
    fn iv_len(&self) -> usize;
    fn block_len(&self) -> usize;
    fn mac_key_len(&self) -> usize;
    fn tag_len(&self) -> usize;

    fn encryptor(&self, key: &[u8], iv: &[u8]) -> SealbackResult<Box<dyn CipherEngine>>;
    fn decryptor(&self, key: &[u8], iv: &[u8]) -> SealbackResult<Box<dyn CipherEngine>>;
    fn mac(&self, key: &[u8]) -> SealbackResult<Box<dyn MacEngine>>;
}

/// AES-256-CBC (PKCS#7) with HMAC-SHA-256 over IV and ciphertext.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256CbcHmacSha256;

impl CipherSuite for Aes256CbcHmacSha256 {
    fn key_len(&self) -> usize {
        KEY_SIZE
    }

    fn iv_len(&self) -> usize {
        IV_SIZE
    }

    fn block_len(&self) -> usize {
        BLOCK_SIZE
    }

    fn mac_key_len(&self) -> usize {
        MAC_KEY_SIZE
    }

    fn tag_len(&self) -> usize {
        MAC_SIZE
    }

    fn encryptor(&self, key: &[u8], iv: &[u8]) -> SealbackResult<Box<dyn CipherEngine>> {
        Ok(Box::new(CbcEncryptor::new(key, iv)?))
    }

    fn decryptor(&self, key: &[u8], iv: &[u8]) -> SealbackResult<Box<dyn CipherEngine>> {
        Ok(Box::new(CbcDecryptor::new(key, iv)?))
    }

    fn mac(&self, key: &[u8]) -> SealbackResult<Box<dyn MacEngine>> {
        Ok(Box::new(HmacSha256Engine::new(key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealback_core::ErrorKind;

    #[test]
    fn suite_reports_container_sizes() {
        let suite = Aes256CbcHmacSha256;
        assert_eq!(suite.key_len(), 32);
        assert_eq!(suite.iv_len(), 16);
        assert_eq!(suite.block_len(), 16);
        assert_eq!(suite.tag_len(), 32);
    }

    #[test]
    fn suite_rejects_wrong_lengths_up_front() {
        let suite = Aes256CbcHmacSha256;
        let err = suite.encryptor(&[0u8; 16], &[0u8; 16]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Construction);
        let err = suite.decryptor(&[0u8; 32], &[0u8; 8]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Construction);
        let err = suite.mac(&[0u8; 20]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Construction);
    }

    #[test]
    fn boxed_engines_round_trip() {
        let suite = Aes256CbcHmacSha256;
        let key = [7u8; 32];
        let iv = [9u8; 16];

        let mut enc = suite.encryptor(&key, &iv).unwrap();
        let mut ct = Vec::new();
        enc.update(b"boxed engine data", &mut ct).unwrap();
        enc.finish(&mut ct).unwrap();

        let mut dec = suite.decryptor(&key, &iv).unwrap();
        let mut pt = Vec::new();
        dec.update(&ct, &mut pt).unwrap();
        dec.finish(&mut pt).unwrap();
        assert_eq!(pt, b"boxed engine data");
    }
}
