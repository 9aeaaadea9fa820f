//! Error types surfaced by `ChatNode`

use crate::core_crypto::CryptoError;
use crate::core_group::GroupError;
use crate::core_protocol::ProtocolError;
use crate::types::GroupId;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),
}

impl From<GroupError> for SessionError {
    fn from(e: GroupError) -> Self {
        match e {
            GroupError::GroupNotFound(id) => SessionError::GroupNotFound(id),
            GroupError::Crypto(e) => SessionError::Crypto(e),
            GroupError::Protocol(e) => SessionError::Protocol(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_error_mapping() {
        let err: SessionError = GroupError::GroupNotFound(GroupId::from("g")).into();
        assert_eq!(err, SessionError::GroupNotFound(GroupId::from("g")));

        let err: SessionError = GroupError::Crypto(CryptoError::AuthenticationFailure).into();
        assert_eq!(err.to_string(), "Authentication failed");
    }
}
