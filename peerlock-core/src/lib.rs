//! Session and protocol layer for peer-to-peer encrypted chat.
//!
//! Nodes connect over a [`core_transport::Transport`], exchange display names
//! and X25519 public keys, then trade ChaCha20-Poly1305 sealed chat
//! messages, chunked files and group broadcasts.

pub mod config;
pub mod core_crypto;
pub mod core_group;
pub mod core_protocol;
pub mod core_session;
pub mod core_transfer;
pub mod core_transport;
pub mod logging;
pub mod metrics;
pub mod test_utils;
pub mod types;

pub use config::Config;
pub use core_session::{ChatNode, NodeEvent, SessionError, SessionResult};
pub use logging::{init_logging, LogLevel};
pub use types::{GroupId, PeerId};
