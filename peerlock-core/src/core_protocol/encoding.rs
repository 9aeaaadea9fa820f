//! Base64 helpers for binary wire fields

use super::errors::{ProtocolError, ProtocolResult};
use crate::core_crypto::NONCE_SIZE;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

/// Encode bytes for a text field
pub fn encode_bytes(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode a base64 text field
pub fn decode_bytes(field: &'static str, text: &str) -> ProtocolResult<Vec<u8>> {
    B64.decode(text)
        .map_err(|e| ProtocolError::Encoding { field, reason: e.to_string() })
}

/// Decode a base64 nonce and check its length
pub fn decode_nonce(text: &str) -> ProtocolResult<[u8; NONCE_SIZE]> {
    let bytes = decode_bytes("nonce", text)?;
    bytes.as_slice().try_into().map_err(|_| ProtocolError::Encoding {
        field: "nonce",
        reason: format!("expected {} bytes, got {}", NONCE_SIZE, bytes.len()),
    })
}
