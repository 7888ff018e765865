//! Archive key material: cipher key + MAC key, and HKDF derivation from a shared secret

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use sealback_core::{SealbackError, SealbackResult};

use crate::{KEY_SIZE, MAC_KEY_SIZE};

const ARCHIVE_KEY_DOMAIN: &[u8] = b"sealback-archive-v1:";

/// The key pair an archive is sealed under. Zeroized on drop.
#[derive(Clone)]
pub struct KeyMaterial {
    cipher_key: [u8; KEY_SIZE],
    mac_key: [u8; MAC_KEY_SIZE],
}

impl KeyMaterial {
    /// Build from raw slices, rejecting any length other than 32 bytes.
    pub fn new(cipher_key: &[u8], mac_key: &[u8]) -> SealbackResult<Self> {
        if cipher_key.len() != KEY_SIZE {
            return Err(SealbackError::KeyLength {
                what: "cipher key",
                expected: KEY_SIZE,
                actual: cipher_key.len(),
            });
        }
        if mac_key.len() != MAC_KEY_SIZE {
            return Err(SealbackError::KeyLength {
                what: "mac key",
                expected: MAC_KEY_SIZE,
                actual: mac_key.len(),
            });
        }

        let mut keys = Self {
            cipher_key: [0u8; KEY_SIZE],
            mac_key: [0u8; MAC_KEY_SIZE],
        };
        keys.cipher_key.copy_from_slice(cipher_key);
        keys.mac_key.copy_from_slice(mac_key);
        Ok(keys)
    }

    pub fn from_bytes(cipher_key: [u8; KEY_SIZE], mac_key: [u8; MAC_KEY_SIZE]) -> Self {
        Self {
            cipher_key,
            mac_key,
        }
    }

    pub fn cipher_key(&self) -> &[u8; KEY_SIZE] {
        &self.cipher_key
    }

    pub fn mac_key(&self) -> &[u8; MAC_KEY_SIZE] {
        &self.mac_key
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("cipher_key", &"[REDACTED]")
            .field("mac_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive per-archive keys from a shared secret via HKDF-SHA256.
///
/// The 64-byte output is split MAC key first, cipher key second.
pub fn derive_key_material(secret: &[u8], archive_id: &[u8]) -> SealbackResult<KeyMaterial> {
    let hkdf = Hkdf::<Sha256>::new(None, secret);

    let mut info = Vec::with_capacity(ARCHIVE_KEY_DOMAIN.len() + archive_id.len());
    info.extend_from_slice(ARCHIVE_KEY_DOMAIN);
    info.extend_from_slice(archive_id);

    let mut okm = [0u8; MAC_KEY_SIZE + KEY_SIZE];
    hkdf.expand(&info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;

    let keys = KeyMaterial::new(&okm[MAC_KEY_SIZE..], &okm[..MAC_KEY_SIZE]);
    okm.zeroize();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealback_core::ErrorKind;

    #[test]
    fn test_new_rejects_bad_lengths() {
        let err = KeyMaterial::new(&[0u8; 16], &[0u8; 32]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(err.to_string().contains("cipher key"));

        let err = KeyMaterial::new(&[0u8; 32], &[0u8; 33]).unwrap_err();
        assert!(err.to_string().contains("mac key"));
    }

    #[test]
    fn test_debug_is_redacted() {
        let keys = KeyMaterial::from_bytes([0xAB; 32], [0xCD; 32]);
        let debug = format!("{keys:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_derive_deterministic() {
        let k1 = derive_key_material(b"shared secret", b"archive-1").unwrap();
        let k2 = derive_key_material(b"shared secret", b"archive-1").unwrap();
        assert_eq!(k1.cipher_key(), k2.cipher_key());
        assert_eq!(k1.mac_key(), k2.mac_key());
    }

    #[test]
    fn test_derive_separates_archives_and_halves() {
        let k1 = derive_key_material(b"shared secret", b"archive-1").unwrap();
        let k2 = derive_key_material(b"shared secret", b"archive-2").unwrap();
        assert_ne!(k1.cipher_key(), k2.cipher_key());
        assert_ne!(k1.mac_key(), k2.mac_key());
        assert_ne!(k1.cipher_key(), k1.mac_key(), "cipher and mac keys must differ");
    }
}
