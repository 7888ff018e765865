//! HMAC-SHA-256 accumulator and constant-time tag comparison

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use sealback_core::{SealbackError, SealbackResult};

use crate::engine::MacEngine;
use crate::MAC_KEY_SIZE;

type HmacSha256 = Hmac<Sha256>;

pub struct HmacSha256Engine {
    inner: HmacSha256,
}

impl HmacSha256Engine {
    pub fn new(key: &[u8]) -> SealbackResult<Self> {
        if key.len() != MAC_KEY_SIZE {
            return Err(SealbackError::KeyLength {
                what: "mac key",
                expected: MAC_KEY_SIZE,
                actual: key.len(),
            });
        }
        let inner = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| {
            SealbackError::KeyLength {
                what: "mac key",
                expected: MAC_KEY_SIZE,
                actual: key.len(),
            }
        })?;
        Ok(Self { inner })
    }
}

impl MacEngine for HmacSha256Engine {
    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.inner.finalize().into_bytes().to_vec()
    }
}

/// Compare two tags without leaking the position of the first difference.
///
/// Length is not secret, so a length mismatch returns early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(key: &[u8], pieces: &[&[u8]]) -> Vec<u8> {
        let mut mac: Box<dyn MacEngine> = Box::new(HmacSha256Engine::new(key).unwrap());
        for p in pieces {
            mac.update(p);
        }
        mac.finalize()
    }

    #[test]
    fn rfc4231_case_2_with_padded_key() {
        // RFC 4231 test case 2 uses the 4-byte key "Jefe"; HMAC zero-pads keys
        // shorter than the block size, so the 32-byte zero-extended key is equivalent.
        let mut key = [0u8; 32];
        key[..4].copy_from_slice(b"Jefe");
        let t = tag(&key, &[&b"what do ya want "[..], &b"for nothing?"[..]]);
        let expected: [u8; 32] = [
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ];
        assert_eq!(t, expected);
    }

    #[test]
    fn chunking_does_not_change_tag() {
        let key = [3u8; 32];
        let data = b"the quick brown fox jumps over the lazy dog";
        let whole = tag(&key, &[&data[..]]);
        let split = tag(&key, &[&data[..5], &data[5..6], &data[6..]]);
        assert_eq!(whole, split);
        assert_eq!(whole.len(), 32);
    }

    #[test]
    fn rejects_non_32_byte_key() {
        assert!(HmacSha256Engine::new(&[0u8; 31]).is_err());
        assert!(HmacSha256Engine::new(&[0u8; 64]).is_err());
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abce"));
        assert!(!constant_time_eq(b"abcd", b"abc"));
        assert!(constant_time_eq(b"", b""));
    }
}
