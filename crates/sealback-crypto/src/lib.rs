//! sealback-crypto: primitives behind the archive container
//!
//! Container layout:
//! ```text
//! [16 bytes: IV][AES-256-CBC ciphertext, PKCS#7 padded][32 bytes: HMAC-SHA-256(IV || ciphertext)]
//! ```
//!
//! Key material:
//! ```text
//! Shared secret
//!   └── HKDF-SHA256(info = domain || archive_id) → 64 bytes
//!       ├── [0..32]  MAC key    (HMAC-SHA-256)
//!       └── [32..64] cipher key (AES-256-CBC)
//! ```
//!
//! The engines are reached through the [`CipherSuite`] trait so the pipeline
//! never names a concrete primitive.

pub mod aes_cbc;
pub mod engine;
pub mod iv;
pub mod keys;
pub mod mac;

pub use engine::{Aes256CbcHmacSha256, CipherEngine, CipherSuite, MacEngine};
pub use iv::{generate_iv, IvLedger, DEFAULT_IV_WINDOW};
pub use keys::{derive_key_material, KeyMaterial};
pub use mac::constant_time_eq;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size
pub const IV_SIZE: usize = 16;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// HMAC-SHA-256 key size (enforced, although HMAC itself accepts any length)
pub const MAC_KEY_SIZE: usize = 32;

/// HMAC-SHA-256 tag size
pub const MAC_SIZE: usize = 32;
