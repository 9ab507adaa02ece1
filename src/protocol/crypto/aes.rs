use super::{CryptoError, lengths};
use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use zeroize::Zeroize;

const BLOCK_SIZE: usize = 16;

/// AES-128-CBC audio payload cipher as used by RAOP
///
/// Every packet restarts from the session IV (no chaining between packets).
/// Only whole 16-byte blocks are encrypted; a trailing partial block is
/// sent in the clear.
pub struct AesCbcCipher {
    cipher: Aes128,
    iv: [u8; 16],
}

impl AesCbcCipher {
    /// Create cipher with 16-byte key and 16-byte IV
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let mut key: [u8; 16] = key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: lengths::AES_128_KEY,
            actual: key.len(),
        })?;
        let iv: [u8; 16] = iv.try_into().map_err(|_| CryptoError::InvalidIvLength {
            expected: lengths::AES_CBC_IV,
            actual: iv.len(),
        })?;

        let cipher = Aes128::new(GenericArray::from_slice(&key));
        key.zeroize();

        Ok(Self { cipher, iv })
    }

    /// Decrypt a packet payload into `out`
    ///
    /// `out` is cleared first and ends up the same length as `encrypted`.
    pub fn decrypt_into(&self, encrypted: &[u8], out: &mut Vec<u8>) {
        out.clear();
        out.extend_from_slice(encrypted);

        let encrypted_len = (encrypted.len() / BLOCK_SIZE) * BLOCK_SIZE;
        let mut prev = self.iv;

        for block in out[..encrypted_len].chunks_exact_mut(BLOCK_SIZE) {
            let mut ciphertext = [0u8; BLOCK_SIZE];
            ciphertext.copy_from_slice(block);

            self.cipher
                .decrypt_block(GenericArray::from_mut_slice(block));
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= *p;
            }
            prev = ciphertext;
        }
    }

    /// Decrypt a packet payload, returning a new buffer
    #[must_use]
    pub fn decrypt(&self, encrypted: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(encrypted.len());
        self.decrypt_into(encrypted, &mut out);
        out
    }

    /// Encrypt a packet payload the way a RAOP sender does
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut out = plaintext.to_vec();
        let encrypted_len = (plaintext.len() / BLOCK_SIZE) * BLOCK_SIZE;
        let mut prev = self.iv;

        for block in out[..encrypted_len].chunks_exact_mut(BLOCK_SIZE) {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= *p;
            }
            self.cipher
                .encrypt_block(GenericArray::from_mut_slice(block));
            prev.copy_from_slice(block);
        }

        out
    }
}

impl Drop for AesCbcCipher {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl std::fmt::Debug for AesCbcCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCbcCipher").finish_non_exhaustive()
    }
}
