//! Wire envelopes
//!
//! Every unit exchanged between peers is a JSON object
//! `{"type": <tag>, "payload": {...}}`. Binary fields are base64 text so
//! the envelope survives text-oriented transports. Field names follow the
//! format spoken by existing peers and must not change.

use super::encoding::{decode_bytes, decode_nonce, encode_bytes};
use super::errors::{ProtocolError, ProtocolResult};
use crate::core_crypto::{SealedPayload, NONCE_SIZE};
use crate::types::{GroupId, PeerId};
use serde::{Deserialize, Serialize};
use std::fmt;

fn unknown_name() -> String {
    "Unknown".to_string()
}

/// `handshake`: sent by both sides as soon as a connection opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    #[serde(default = "unknown_name")]
    pub username: String,
}

/// `public_key`: the sender's X25519 public key, base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyPayload {
    pub public_key: String,
}

/// AEAD output as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBody {
    pub ciphertext: String,
    pub nonce: String,
}

impl EncryptedBody {
    pub fn from_sealed(sealed: &SealedPayload) -> Self {
        Self { ciphertext: encode_bytes(&sealed.ciphertext), nonce: encode_bytes(&sealed.nonce) }
    }

    /// Decode into `(nonce, ciphertext)`
    pub fn decode(&self) -> ProtocolResult<([u8; NONCE_SIZE], Vec<u8>)> {
        let nonce = decode_nonce(&self.nonce)?;
        let ciphertext = decode_bytes("ciphertext", &self.ciphertext)?;
        Ok((nonce, ciphertext))
    }
}

/// `file_start`: opens an inbound transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStartPayload {
    pub filename: String,
    /// Total ciphertext length in bytes
    pub filesize: u64,
    pub nonce: String,
}

/// `file_chunk`: one contiguous ciphertext slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunkPayload {
    pub data: String,
}

/// `file_end`: closes the transfer; carries no fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEndPayload {}

/// `group_invite`: creator hands the group key and member list to an invitee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInvitePayload {
    pub group_id: GroupId,
    pub group_name: String,
    pub creator_id: PeerId,
    pub group_key: String,
    #[serde(default)]
    pub members: Vec<PeerId>,
}

/// `group_message`: one group-key ciphertext, fanned out to members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessagePayload {
    pub group_id: GroupId,
    pub sender: String,
    #[serde(flatten)]
    pub body: EncryptedBody,
}

/// `group_join`: advisory presence notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupJoinPayload {
    pub group_id: GroupId,
}

/// Closed set of envelope kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    Handshake(HandshakePayload),
    PublicKey(PublicKeyPayload),
    Chat(EncryptedBody),
    FileStart(FileStartPayload),
    FileChunk(FileChunkPayload),
    FileEnd(FileEndPayload),
    GroupInvite(GroupInvitePayload),
    GroupMessage(GroupMessagePayload),
    GroupJoin(GroupJoinPayload),
}

/// Tag of an envelope, used for logging and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Handshake,
    PublicKey,
    Chat,
    FileStart,
    FileChunk,
    FileEnd,
    GroupInvite,
    GroupMessage,
    GroupJoin,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Handshake => "handshake",
            EnvelopeKind::PublicKey => "public_key",
            EnvelopeKind::Chat => "chat",
            EnvelopeKind::FileStart => "file_start",
            EnvelopeKind::FileChunk => "file_chunk",
            EnvelopeKind::FileEnd => "file_end",
            EnvelopeKind::GroupInvite => "group_invite",
            EnvelopeKind::GroupMessage => "group_message",
            EnvelopeKind::GroupJoin => "group_join",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Envelope {
    pub fn handshake(username: impl Into<String>) -> Self {
        Envelope::Handshake(HandshakePayload { username: username.into() })
    }

    pub fn public_key(public_key_base64: impl Into<String>) -> Self {
        Envelope::PublicKey(PublicKeyPayload { public_key: public_key_base64.into() })
    }

    pub fn chat(sealed: &SealedPayload) -> Self {
        Envelope::Chat(EncryptedBody::from_sealed(sealed))
    }

    pub fn file_start(filename: impl Into<String>, filesize: u64, nonce: &[u8; NONCE_SIZE]) -> Self {
        Envelope::FileStart(FileStartPayload {
            filename: filename.into(),
            filesize,
            nonce: encode_bytes(nonce),
        })
    }

    pub fn file_chunk(data: &[u8]) -> Self {
        Envelope::FileChunk(FileChunkPayload { data: encode_bytes(data) })
    }

    pub fn file_end() -> Self {
        Envelope::FileEnd(FileEndPayload::default())
    }

    pub fn group_invite(
        group_id: GroupId,
        group_name: impl Into<String>,
        creator_id: PeerId,
        group_key_base64: impl Into<String>,
        members: Vec<PeerId>,
    ) -> Self {
        Envelope::GroupInvite(GroupInvitePayload {
            group_id,
            group_name: group_name.into(),
            creator_id,
            group_key: group_key_base64.into(),
            members,
        })
    }

    pub fn group_message(group_id: GroupId, sender: impl Into<String>, sealed: &SealedPayload) -> Self {
        Envelope::GroupMessage(GroupMessagePayload {
            group_id,
            sender: sender.into(),
            body: EncryptedBody::from_sealed(sealed),
        })
    }

    pub fn group_join(group_id: GroupId) -> Self {
        Envelope::GroupJoin(GroupJoinPayload { group_id })
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Handshake(_) => EnvelopeKind::Handshake,
            Envelope::PublicKey(_) => EnvelopeKind::PublicKey,
            Envelope::Chat(_) => EnvelopeKind::Chat,
            Envelope::FileStart(_) => EnvelopeKind::FileStart,
            Envelope::FileChunk(_) => EnvelopeKind::FileChunk,
            Envelope::FileEnd(_) => EnvelopeKind::FileEnd,
            Envelope::GroupInvite(_) => EnvelopeKind::GroupInvite,
            Envelope::GroupMessage(_) => EnvelopeKind::GroupMessage,
            Envelope::GroupJoin(_) => EnvelopeKind::GroupJoin,
        }
    }

    /// Serialize to the JSON bytes handed to the transport
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse one envelope delivered by the transport
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
