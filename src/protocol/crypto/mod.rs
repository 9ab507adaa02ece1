//! Payload cryptography for RAOP audio

#![allow(missing_docs)]

mod aes;
mod error;

pub use self::aes::AesCbcCipher;
pub use self::error::CryptoError;

/// Length of various cryptographic values
pub mod lengths {
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES-CBC IV length
    pub const AES_CBC_IV: usize = 16;
}
