//! Receiver side: one in-progress transfer per sending peer

use super::errors::{TransferError, TransferResult};
use super::progress_percent;
use crate::core_crypto::NONCE_SIZE;
use crate::types::PeerId;
use std::collections::HashMap;
use tracing::{debug, warn};

/// State of a transfer between FILE_START and FILE_END
#[derive(Debug, Clone)]
pub struct InboundTransfer {
    filename: String,
    declared_size: u64,
    nonce: [u8; NONCE_SIZE],
    /// Never grows past `declared_size`
    buffer: Vec<u8>,
    /// Bytes that arrived past `declared_size`; counted, not kept
    discarded: u64,
    overflowed: bool,
}

impl InboundTransfer {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Bytes buffered so far, at most the declared size
    pub fn received(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn arrived(&self) -> u64 {
        self.received().saturating_add(self.discarded)
    }

    /// True once more bytes arrived than were declared
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn progress(&self) -> f64 {
        progress_percent(self.received(), self.declared_size)
    }
}

/// Progress after one appended chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProgress {
    pub filename: String,
    pub received: u64,
    pub total: u64,
    pub percent: f64,
}

/// Reassembled ciphertext handed off at FILE_END
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    pub filename: String,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

pub struct FileAssembler {
    transfers: HashMap<PeerId, InboundTransfer>,
    max_file_size: u64,
}

impl FileAssembler {
    pub fn new(max_file_size: u64) -> Self {
        Self { transfers: HashMap::new(), max_file_size }
    }

    /// Begin a transfer from `peer`, replacing any unfinished one
    pub fn start(
        &mut self,
        peer: &PeerId,
        filename: String,
        declared_size: u64,
        nonce: [u8; NONCE_SIZE],
    ) -> TransferResult<()> {
        if declared_size > self.max_file_size {
            return Err(TransferError::TooLarge { size: declared_size, max: self.max_file_size });
        }

        // Preallocate at most one megabyte; the declared size is only a claim
        let capacity = declared_size.min(1024 * 1024) as usize;
        let transfer = InboundTransfer {
            filename,
            declared_size,
            nonce,
            buffer: Vec::with_capacity(capacity),
            discarded: 0,
            overflowed: false,
        };

        if let Some(previous) = self.transfers.insert(peer.clone(), transfer) {
            warn!(
                peer_id = %peer,
                filename = %previous.filename,
                received = previous.received(),
                "Unfinished transfer replaced by a new FILE_START"
            );
        }
        Ok(())
    }

    /// Append one chunk in arrival order.
    ///
    /// Bytes past the declared size are counted but not buffered, so a
    /// transfer never holds more than `max_file_size`.
    pub fn append(&mut self, peer: &PeerId, chunk: &[u8]) -> TransferResult<ChunkProgress> {
        let transfer = self
            .transfers
            .get_mut(peer)
            .ok_or_else(|| TransferError::NoActiveTransfer(peer.clone()))?;

        let room = transfer.declared_size.saturating_sub(transfer.received());
        let kept = chunk.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        transfer.buffer.extend_from_slice(&chunk[..kept]);
        transfer.discarded = transfer.discarded.saturating_add((chunk.len() - kept) as u64);

        if !transfer.overflowed && transfer.discarded > 0 {
            transfer.overflowed = true;
            warn!(
                peer_id = %peer,
                filename = %transfer.filename,
                declared = transfer.declared_size,
                received = transfer.arrived(),
                "Transfer exceeded its declared size"
            );
        }

        Ok(ChunkProgress {
            filename: transfer.filename.clone(),
            received: transfer.received(),
            total: transfer.declared_size,
            percent: transfer.progress(),
        })
    }

    /// Close the transfer from `peer` and hand off its ciphertext
    pub fn finish(&mut self, peer: &PeerId) -> TransferResult<CompletedTransfer> {
        let transfer = self
            .transfers
            .remove(peer)
            .ok_or_else(|| TransferError::NoActiveTransfer(peer.clone()))?;

        if transfer.overflowed {
            let received = transfer.arrived();
            return Err(TransferError::Overflowed {
                filename: transfer.filename,
                declared: transfer.declared_size,
                received,
            });
        }

        if transfer.received() < transfer.declared_size {
            debug!(
                peer_id = %peer,
                filename = %transfer.filename,
                declared = transfer.declared_size,
                received = transfer.received(),
                "Transfer ended short of its declared size"
            );
        }

        Ok(CompletedTransfer {
            filename: transfer.filename,
            ciphertext: transfer.buffer,
            nonce: transfer.nonce,
        })
    }

    /// Drop the transfer from a departed peer
    pub fn abandon(&mut self, peer: &PeerId) -> Option<InboundTransfer> {
        self.transfers.remove(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&InboundTransfer> {
        self.transfers.get(peer)
    }

    pub fn active_count(&self) -> usize {
        self.transfers.len()
    }
}
