//! Session metrics
//!
//! Counters go to the `metrics` facade (a no-op until the embedding
//! application installs a recorder) and to a local [`MetricsCollector`]
//! that tests and the CLI can read back.

use metrics::describe_counter;

mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};

pub const ENVELOPES_RECEIVED: &str = "peerlock.envelopes.received";
pub const ENVELOPES_SENT: &str = "peerlock.envelopes.sent";
pub const ENVELOPES_DROPPED: &str = "peerlock.envelopes.dropped";
pub const DECRYPT_FAILURES: &str = "peerlock.decrypt.failures";
pub const FILES_RECEIVED: &str = "peerlock.files.received";
pub const GROUP_BROADCASTS: &str = "peerlock.groups.broadcasts";

/// Register counter descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(ENVELOPES_RECEIVED, "Envelopes decoded from peers");
    describe_counter!(ENVELOPES_SENT, "Envelopes accepted by the transport");
    describe_counter!(ENVELOPES_DROPPED, "Inbound envelopes dropped as malformed or out of sequence");
    describe_counter!(DECRYPT_FAILURES, "Chat, group or file payloads that failed to decrypt");
    describe_counter!(FILES_RECEIVED, "File transfers reassembled and handed off");
    describe_counter!(GROUP_BROADCASTS, "Group messages fanned out by this node");
}
