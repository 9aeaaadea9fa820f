//! Error types for group operations

use crate::core_crypto::CryptoError;
use crate::core_protocol::ProtocolError;
use crate::types::GroupId;
use thiserror::Error;

pub type GroupResult<T> = Result<T, GroupError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
