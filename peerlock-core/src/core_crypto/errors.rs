//! Error types for session crypto operations

use thiserror::Error;

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the crypto engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// No shared or group key exists for the target
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// AEAD tag did not verify (tampered data or wrong key)
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// Key material has the wrong length or shape
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Text-encoded key material could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The cipher refused to seal the plaintext
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::Encoding(e.to_string())
    }
}
