use thiserror::Error;

/// Errors building the session cipher
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid AES key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid AES IV length: expected {expected}, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },
}
