//! Error types for envelope encoding and decoding

use thiserror::Error;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while turning bytes into envelopes and back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Unknown type tag, missing field or invalid JSON
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A base64 field did not decode to the expected bytes
    #[error("Invalid encoding in field '{field}': {reason}")]
    Encoding { field: &'static str, reason: String },

    /// Envelope could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::MalformedEnvelope(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::Encoding { field: "nonce", reason: "bad length".to_string() };
        assert_eq!(err.to_string(), "Invalid encoding in field 'nonce': bad length");
    }

    #[test]
    fn test_json_error_is_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }
}
