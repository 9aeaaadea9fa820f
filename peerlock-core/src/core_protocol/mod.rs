//! Message envelope protocol
//!
//! Defines the nine envelope kinds exchanged between peers and their JSON
//! wire form. Framing (one envelope per delivery) belongs to the transport.

pub mod encoding;
pub mod envelope;
pub mod errors;

pub use envelope::{
    EncryptedBody, Envelope, EnvelopeKind, FileChunkPayload, FileEndPayload, FileStartPayload,
    GroupInvitePayload, GroupJoinPayload, GroupMessagePayload, HandshakePayload, PublicKeyPayload,
};
pub use errors::{ProtocolError, ProtocolResult};
