//! Block cipher seam: raw AES-256, 16-byte blocks, no nonce, no
//! authentication tag.
//!
//! This is deliberately not AES-GCM: both PAK index encryption and IO Store
//! TOC/block encryption apply the cipher independently to each 16-byte
//! block of already-aligned ciphertext, with the key supplied directly by
//! the active profile rather than derived from a password.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit};
use aes::Aes256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encrypted payload length {0} is not a multiple of 16")]
    Unaligned(usize),
    #[error("block is encrypted but no decryption key was supplied")]
    MissingKey,
}

/// Round `n` up to the next multiple of 16. The on-disk length of any
/// encrypted region is always this ceiling of its logical length.
#[inline]
pub fn align16(n: u64) -> u64 {
    (n + 15) & !15
}

/// Decrypt `bytes` in place, one 16-byte ECB block at a time. `bytes.len()`
/// must be a multiple of 16 — callers are expected to have already read
/// `align16(logical_len)` bytes, never a partial block.
pub fn decrypt_in_place(bytes: &mut [u8], key: &[u8; 32]) -> Result<(), CryptoError> {
    if bytes.len() % 16 != 0 {
        return Err(CryptoError::Unaligned(bytes.len()));
    }
    let cipher = Aes256::new(GenericArray::from_slice(key));
    for chunk in bytes.chunks_exact_mut(16) {
        let block = GenericArray::from_mut_slice(chunk);
        cipher.decrypt_block(block);
    }
    Ok(())
}
