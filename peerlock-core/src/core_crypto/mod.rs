//! Session crypto engine
//!
//! X25519 key agreement per peer, random symmetric keys per group, and
//! ChaCha20-Poly1305 authenticated encryption for both.

pub mod engine;
pub mod errors;
pub mod identity;

pub use engine::{CryptoEngine, SealedPayload, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use errors::{CryptoError, CryptoResult};
pub use identity::{NodeIdentity, PUBLIC_KEY_SIZE};
