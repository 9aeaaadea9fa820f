use super::{
    DECRYPT_FAILURES, ENVELOPES_DROPPED, ENVELOPES_RECEIVED, ENVELOPES_SENT, FILES_RECEIVED,
    GROUP_BROADCASTS,
};
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub envelopes_received: u64,
    pub envelopes_sent: u64,
    pub envelopes_dropped: u64,
    pub decrypt_failures: u64,
    pub files_received: u64,
    pub group_broadcasts: u64,
}

/// Per-node counters, mirrored to the `metrics` facade
#[derive(Debug, Default)]
pub struct MetricsCollector {
    envelopes_received: AtomicU64,
    envelopes_sent: AtomicU64,
    envelopes_dropped: AtomicU64,
    decrypt_failures: AtomicU64,
    files_received: AtomicU64,
    group_broadcasts: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.envelopes_received.fetch_add(1, Ordering::Relaxed);
        counter!(ENVELOPES_RECEIVED).increment(1);
    }

    pub fn inc_sent(&self) {
        self.envelopes_sent.fetch_add(1, Ordering::Relaxed);
        counter!(ENVELOPES_SENT).increment(1);
    }

    pub fn inc_dropped(&self) {
        self.envelopes_dropped.fetch_add(1, Ordering::Relaxed);
        counter!(ENVELOPES_DROPPED).increment(1);
    }

    pub fn inc_decrypt_failures(&self) {
        self.decrypt_failures.fetch_add(1, Ordering::Relaxed);
        counter!(DECRYPT_FAILURES).increment(1);
    }

    pub fn inc_files_received(&self) {
        self.files_received.fetch_add(1, Ordering::Relaxed);
        counter!(FILES_RECEIVED).increment(1);
    }

    pub fn inc_group_broadcasts(&self) {
        self.group_broadcasts.fetch_add(1, Ordering::Relaxed);
        counter!(GROUP_BROADCASTS).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            envelopes_received: self.envelopes_received.load(Ordering::Relaxed),
            envelopes_sent: self.envelopes_sent.load(Ordering::Relaxed),
            envelopes_dropped: self.envelopes_dropped.load(Ordering::Relaxed),
            decrypt_failures: self.decrypt_failures.load(Ordering::Relaxed),
            files_received: self.files_received.load(Ordering::Relaxed),
            group_broadcasts: self.group_broadcasts.load(Ordering::Relaxed),
        }
    }
}
