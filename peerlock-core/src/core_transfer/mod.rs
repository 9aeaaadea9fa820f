//! Chunked file transfer
//!
//! The sender seals a whole file once, then streams the ciphertext as
//! FILE_START / FILE_CHUNK* / FILE_END. The receiver only reassembles
//! ciphertext; decryption happens after FILE_END, outside the assembler.
//! Chunk order relies on the transport's per-connection FIFO delivery.

pub mod assembler;
pub mod errors;
pub mod sender;

pub use assembler::{ChunkProgress, CompletedTransfer, FileAssembler, InboundTransfer};
pub use errors::{TransferError, TransferResult};
pub use sender::OutboundTransfer;

/// Progress as a percentage in `[0, 100]`; an empty transfer is complete
pub fn progress_percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Direction of a transfer, as reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Sent,
    Received,
}
