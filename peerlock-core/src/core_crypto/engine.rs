//! Session crypto engine
//!
//! Holds the node identity plus every piece of derived secret material:
//! one ChaCha20-Poly1305 key per peer (the raw X25519 shared secret) and one
//! per group (32 random bytes chosen by the group creator).
//!
//! The maps are guarded by `RwLock`s so the engine can be shared behind an
//! `Arc` between the dispatch path and background send tasks. All
//! operations are synchronous and never block on I/O.

use super::errors::{CryptoError, CryptoResult};
use super::identity::{NodeIdentity, PUBLIC_KEY_SIZE};
use crate::types::{GroupId, PeerId};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};
use zeroize::Zeroizing;

/// Size of a symmetric key (ChaCha20-Poly1305)
pub const KEY_SIZE: usize = 32;

/// Size of an AEAD nonce (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the Poly1305 tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

type SymmetricKey = Zeroizing<[u8; KEY_SIZE]>;

/// Output of one AEAD seal: ciphertext (with tag) and the nonce used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

/// Imported public key and the shared key derived from it.
///
/// Both halves live in the same entry so a shared key exists exactly when
/// the peer's public key has been imported.
struct PeerKeys {
    public: [u8; PUBLIC_KEY_SIZE],
    shared: SymmetricKey,
}

/// Per-node crypto state
pub struct CryptoEngine {
    identity: NodeIdentity,
    peers: RwLock<HashMap<PeerId, PeerKeys>>,
    groups: RwLock<HashMap<GroupId, SymmetricKey>>,
}

impl CryptoEngine {
    /// Create an engine around an existing identity
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            peers: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Create an engine with a freshly generated identity
    pub fn generate() -> Self {
        Self::new(NodeIdentity::generate())
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Raw public key of this node
    pub fn export_public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.identity.public_key_bytes()
    }

    /// Public key of this node encoded for the wire
    pub fn export_public_key_base64(&self) -> String {
        self.identity.public_key_base64()
    }

    // ------------------------------------------------------------------
    // Peer keys
    // ------------------------------------------------------------------

    /// Import a peer's public key and derive the shared key.
    ///
    /// Accepts the 32 raw key bytes or their base64 text. Re-importing
    /// overwrites the previous entry for `peer_id`.
    pub fn import_peer_key(&self, peer_id: &PeerId, key_material: &[u8]) -> CryptoResult<()> {
        let public = decode_key_material(key_material)?;
        let shared = self.identity.diffie_hellman(&public);

        let entry = PeerKeys { public, shared: Zeroizing::new(shared.to_bytes()) };
        let replaced = self.write_peers().insert(peer_id.clone(), entry).is_some();

        debug!(peer_id = %peer_id, replaced, "Derived shared key");
        Ok(())
    }

    pub fn has_shared_key(&self, peer_id: &PeerId) -> bool {
        self.read_peers().contains_key(peer_id)
    }

    /// The public key previously imported for `peer_id`
    pub fn peer_public_key(&self, peer_id: &PeerId) -> Option<[u8; PUBLIC_KEY_SIZE]> {
        self.read_peers().get(peer_id).map(|keys| keys.public)
    }

    /// Forget a peer's public key and shared key together
    pub fn remove_peer(&self, peer_id: &PeerId) -> bool {
        self.write_peers().remove(peer_id).is_some()
    }

    /// Number of peers with a shared key
    pub fn peer_count(&self) -> usize {
        self.read_peers().len()
    }

    /// Encrypt `plaintext` under the key shared with `peer_id`
    pub fn encrypt_for(&self, peer_id: &PeerId, plaintext: &[u8]) -> CryptoResult<SealedPayload> {
        let peers = self.read_peers();
        let keys = peers
            .get(peer_id)
            .ok_or_else(|| CryptoError::KeyNotFound(format!("peer {}", peer_id)))?;
        seal(&keys.shared, plaintext)
    }

    /// Decrypt a payload sent by `peer_id`
    pub fn decrypt_from(
        &self,
        peer_id: &PeerId,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let peers = self.read_peers();
        let keys = peers
            .get(peer_id)
            .ok_or_else(|| CryptoError::KeyNotFound(format!("peer {}", peer_id)))?;
        open(&keys.shared, nonce, ciphertext)
    }

    /// Try every known peer key until one opens the payload.
    ///
    /// Only meant for payloads whose sender cannot be identified. The scan
    /// order is unspecified; with a sound AEAD at most one key can verify.
    pub fn decrypt_any(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let peers = self.read_peers();
        for (peer_id, keys) in peers.iter() {
            if let Ok(plaintext) = open(&keys.shared, nonce, ciphertext) {
                trace!(peer_id = %peer_id, "Fallback decryption matched peer key");
                return Ok(plaintext);
            }
        }
        Err(CryptoError::AuthenticationFailure)
    }

    // ------------------------------------------------------------------
    // Group keys
    // ------------------------------------------------------------------

    /// Create a fresh random key for `group_id`, replacing any previous one
    pub fn create_group_key(&self, group_id: &GroupId) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        self.write_groups().insert(group_id.clone(), Zeroizing::new(key));
        debug!(group_id = %group_id, "Created group key");
        key
    }

    /// Store a group key received from the wire (raw or base64)
    pub fn import_group_key(&self, group_id: &GroupId, key_material: &[u8]) -> CryptoResult<()> {
        let key = decode_key_material(key_material)?;
        self.write_groups().insert(group_id.clone(), Zeroizing::new(key));
        debug!(group_id = %group_id, "Imported group key");
        Ok(())
    }

    pub fn has_group_key(&self, group_id: &GroupId) -> bool {
        self.read_groups().contains_key(group_id)
    }

    /// Base64 form of a group key for distribution in invitations
    pub fn export_group_key_base64(&self, group_id: &GroupId) -> CryptoResult<String> {
        self.read_groups()
            .get(group_id)
            .map(|key| B64.encode(key.as_slice()))
            .ok_or_else(|| CryptoError::KeyNotFound(format!("group {}", group_id)))
    }

    pub fn encrypt_for_group(
        &self,
        group_id: &GroupId,
        plaintext: &[u8],
    ) -> CryptoResult<SealedPayload> {
        let groups = self.read_groups();
        let key = groups
            .get(group_id)
            .ok_or_else(|| CryptoError::KeyNotFound(format!("group {}", group_id)))?;
        seal(key, plaintext)
    }

    pub fn decrypt_for_group(
        &self,
        group_id: &GroupId,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let groups = self.read_groups();
        let key = groups
            .get(group_id)
            .ok_or_else(|| CryptoError::KeyNotFound(format!("group {}", group_id)))?;
        open(key, nonce, ciphertext)
    }

    // A panic while holding one of these locks cannot leave a map half
    // written, so poisoned guards are recovered.

    fn read_peers(&self) -> RwLockReadGuard<'_, HashMap<PeerId, PeerKeys>> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_peers(&self) -> RwLockWriteGuard<'_, HashMap<PeerId, PeerKeys>> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_groups(&self) -> RwLockReadGuard<'_, HashMap<GroupId, SymmetricKey>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_groups(&self) -> RwLockWriteGuard<'_, HashMap<GroupId, SymmetricKey>> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn shared_key_bytes(&self, peer_id: &PeerId) -> Option<[u8; KEY_SIZE]> {
        self.read_peers().get(peer_id).map(|keys| *keys.shared)
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("identity", &self.identity)
            .field("peers", &self.peer_count())
            .field("groups", &self.read_groups().len())
            .finish()
    }
}

/// Accept 32 raw bytes, otherwise treat the input as base64 text
fn decode_key_material(material: &[u8]) -> CryptoResult<[u8; KEY_SIZE]> {
    if material.len() == KEY_SIZE {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(material);
        return Ok(key);
    }

    let text = std::str::from_utf8(material)
        .map_err(|_| CryptoError::InvalidKey(format!("{} bytes, not base64 text", material.len())))?;
    let decoded = Zeroizing::new(B64.decode(text.trim())?);

    if decoded.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            decoded.len()
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&decoded);
    Ok(key)
}

fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<SealedPayload> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(nonce.as_slice());

    Ok(SealedPayload { ciphertext, nonce: nonce_bytes })
}

fn open(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailure)
}
