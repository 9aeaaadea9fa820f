//! Error types for file transfer reassembly

use crate::types::PeerId;
use thiserror::Error;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// FILE_CHUNK or FILE_END without a preceding FILE_START
    #[error("No active transfer from peer {0}")]
    NoActiveTransfer(PeerId),

    #[error("Declared size {size} exceeds limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// More bytes arrived than FILE_START declared; the transfer is discarded
    #[error("Transfer '{filename}' overflowed: {received} of {declared} bytes")]
    Overflowed { filename: String, declared: u64, received: u64 },
}
