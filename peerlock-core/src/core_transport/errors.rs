//! Error types for the reference transports

use crate::types::PeerId;
use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The node id exchange that opens every connection failed
    #[error("Connection hello failed: {0}")]
    Hello(String),

    #[error("Already connected to peer {0}")]
    DuplicatePeer(PeerId),

    #[error("Frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },
}
