//! Sender side: turns one sealed file into its envelope sequence

use super::progress_percent;
use crate::core_crypto::SealedPayload;
use crate::core_protocol::Envelope;

/// An outbound file, already sealed as a single AEAD unit
#[derive(Debug, Clone)]
pub struct OutboundTransfer {
    filename: String,
    sealed: SealedPayload,
    chunk_size: usize,
}

impl OutboundTransfer {
    /// `chunk_size` of zero is treated as one byte
    pub fn new(filename: impl Into<String>, sealed: SealedPayload, chunk_size: usize) -> Self {
        Self { filename: filename.into(), sealed, chunk_size: chunk_size.max(1) }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Ciphertext length declared in FILE_START
    pub fn total_size(&self) -> u64 {
        self.sealed.ciphertext.len() as u64
    }

    pub fn chunk_count(&self) -> usize {
        self.sealed.ciphertext.len().div_ceil(self.chunk_size)
    }

    pub fn start_envelope(&self) -> Envelope {
        Envelope::file_start(self.filename.clone(), self.total_size(), &self.sealed.nonce)
    }

    /// FILE_CHUNK envelopes in send order, each with the progress reached after it
    pub fn chunks(&self) -> impl Iterator<Item = (Envelope, f64)> + '_ {
        let total = self.total_size();
        let mut sent = 0u64;
        self.sealed.ciphertext.chunks(self.chunk_size).map(move |slice| {
            sent += slice.len() as u64;
            (Envelope::file_chunk(slice), progress_percent(sent, total))
        })
    }

    pub fn end_envelope(&self) -> Envelope {
        Envelope::file_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_protocol::EnvelopeKind;

    fn outbound(len: usize, chunk_size: usize) -> OutboundTransfer {
        OutboundTransfer::new(
            "report.pdf",
            SealedPayload { ciphertext: vec![0xAB; len], nonce: [1u8; 12] },
            chunk_size,
        )
    }

    #[test]
    fn test_start_declares_ciphertext_size() {
        let transfer = outbound(100, 32);
        match transfer.start_envelope() {
            Envelope::FileStart(start) => {
                assert_eq!(start.filename, "report.pdf");
                assert_eq!(start.filesize, 100);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transfer.end_envelope().kind(), EnvelopeKind::FileEnd);
    }

    #[test]
    fn test_chunk_sequence_and_progress() {
        let transfer = outbound(100, 32);
        assert_eq!(transfer.chunk_count(), 4);

        let progress: Vec<f64> = transfer.chunks().map(|(_, p)| p).collect();
        assert_eq!(progress, vec![32.0, 64.0, 96.0, 100.0]);
    }

    #[test]
    fn test_zero_chunk_size_still_progresses() {
        let transfer = outbound(3, 0);
        assert_eq!(transfer.chunk_count(), 3);
        assert_eq!(transfer.chunks().count(), 3);
    }
}
