//! Long-term node identity
//!
//! Each node owns a single X25519 key pair for the lifetime of the process.
//! The secret half never leaves this type; the public half is exported as
//! raw bytes (or base64 for the wire) and handed to peers during key exchange.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::RngCore;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 key pair owned by this node
///
/// `StaticSecret` zeroizes itself on drop.
pub struct NodeIdentity {
    secret: StaticSecret,
    public: PublicKey,
}

impl NodeIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self::from_secret_bytes(seed)
    }

    /// Build an identity from a fixed 32-byte secret (deterministic tests)
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw public key bytes for transmission
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Base64 form of the public key, as carried in `public_key` envelopes
    pub fn public_key_base64(&self) -> String {
        B64.encode(self.public.as_bytes())
    }

    /// Elliptic-curve Diffie-Hellman with a peer's public key
    pub(crate) fn diffie_hellman(&self, peer_public: &[u8; PUBLIC_KEY_SIZE]) -> SharedSecret {
        self.secret.diffie_hellman(&PublicKey::from(*peer_public))
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("public", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}
