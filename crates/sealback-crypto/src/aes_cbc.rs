//! Streaming AES-256-CBC with PKCS#7 padding
//!
//! Input arrives in arbitrary chunks. The encryptor keeps the partial tail
//! block until more bytes arrive; the decryptor additionally withholds the
//! last complete block, because only end-of-input tells it that the block
//! carries padding.

use cbc::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sealback_core::{SealbackError, SealbackResult};
use subtle::ConstantTimeEq;

use crate::engine::CipherEngine;
use crate::{BLOCK_SIZE, IV_SIZE, KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

fn bad_key_length(actual: usize) -> SealbackError {
    SealbackError::KeyLength {
        what: "cipher key",
        expected: KEY_SIZE,
        actual,
    }
}

fn check_key_iv(key: &[u8], iv: &[u8]) -> SealbackResult<()> {
    if key.len() != KEY_SIZE {
        return Err(bad_key_length(key.len()));
    }
    if iv.len() != IV_SIZE {
        return Err(SealbackError::KeyLength {
            what: "iv",
            expected: IV_SIZE,
            actual: iv.len(),
        });
    }
    Ok(())
}

pub struct CbcEncryptor {
    cipher: Aes256CbcEnc,
    tail: Vec<u8>,
}

impl CbcEncryptor {
    pub fn new(key: &[u8], iv: &[u8]) -> SealbackResult<Self> {
        check_key_iv(key, iv)?;
        let cipher =
            Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| bad_key_length(key.len()))?;
        Ok(Self {
            cipher,
            tail: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    fn encrypt_blocks(&mut self, blocks: &[u8], out: &mut Vec<u8>) {
        debug_assert_eq!(blocks.len() % BLOCK_SIZE, 0);
        let start = out.len();
        out.extend_from_slice(blocks);
        for block in out[start..].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    }
}

impl CipherEngine for CbcEncryptor {
    fn update(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        if !self.tail.is_empty() {
            let take = (BLOCK_SIZE - self.tail.len()).min(input.len());
            self.tail.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.tail.len() < BLOCK_SIZE {
                return Ok(());
            }
            let block = std::mem::take(&mut self.tail);
            self.encrypt_blocks(&block, out);
        }

        let whole = input.len() - input.len() % BLOCK_SIZE;
        self.encrypt_blocks(&input[..whole], out);
        self.tail.extend_from_slice(&input[whole..]);
        Ok(())
    }

    fn finish(mut self: Box<Self>, out: &mut Vec<u8>) -> SealbackResult<()> {
        let pad = BLOCK_SIZE - self.tail.len();
        let mut last = std::mem::take(&mut self.tail);
        last.resize(BLOCK_SIZE, pad as u8);
        self.encrypt_blocks(&last, out);
        Ok(())
    }
}

pub struct CbcDecryptor {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
}

impl CbcDecryptor {
    pub fn new(key: &[u8], iv: &[u8]) -> SealbackResult<Self> {
        check_key_iv(key, iv)?;
        let cipher =
            Aes256CbcDec::new_from_slices(key, iv).map_err(|_| bad_key_length(key.len()))?;
        Ok(Self {
            cipher,
            pending: Vec::with_capacity(2 * BLOCK_SIZE),
        })
    }

    fn decrypt_blocks(&mut self, count: usize, out: &mut Vec<u8>) {
        let len = count * BLOCK_SIZE;
        let start = out.len();
        out.extend_from_slice(&self.pending[..len]);
        for block in out[start..].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pending.drain(..len);
    }
}

impl CipherEngine for CbcDecryptor {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        self.pending.extend_from_slice(input);
        let blocks = self.pending.len() / BLOCK_SIZE;
        // Always keep the newest complete block back: it may be the padded one.
        let ready = if self.pending.len() % BLOCK_SIZE == 0 {
            blocks.saturating_sub(1)
        } else {
            blocks
        };
        if ready > 0 {
            self.decrypt_blocks(ready, out);
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, out: &mut Vec<u8>) -> SealbackResult<()> {
        if self.pending.len() != BLOCK_SIZE {
            return Err(SealbackError::malformed(format!(
                "ciphertext is not a whole number of {BLOCK_SIZE}-byte blocks ({} trailing bytes)",
                self.pending.len()
            )));
        }

        let mut last = Vec::with_capacity(BLOCK_SIZE);
        self.decrypt_blocks(1, &mut last);

        // the pad value itself is not secret; the bytes it covers are compared
        // in constant time
        let pad = last[BLOCK_SIZE - 1];
        if pad == 0 || usize::from(pad) > BLOCK_SIZE {
            return Err(SealbackError::malformed("invalid PKCS#7 padding in final block"));
        }
        let start = BLOCK_SIZE - usize::from(pad);
        let expected = [pad; BLOCK_SIZE];
        if !bool::from(last[start..].ct_eq(&expected[start..])) {
            return Err(SealbackError::malformed("corrupt PKCS#7 padding in final block"));
        }
        out.extend_from_slice(&last[..start]);
        Ok(())
    }
}
