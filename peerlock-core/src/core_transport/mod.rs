/*
  Transport contract

  The session layer does not own sockets. It consumes a stream of
  `TransportEvent`s and pushes outbound frames through the `Transport` trait.

  Guarantees a transport must provide:
    - one `Connected` and one `Disconnected` per connection
    - frames from one connection are delivered in order, exactly once,
      one envelope per `Frame` event
    - peer ids are the remote node's own id (exchanged by the transport)

  Two implementations live here:
    - `TcpTransport`: tokio TCP with a 4-byte big-endian length prefix
    - `MemoryNetwork`: in-process links for tests and simulations

  ┌──────────────┐  TransportEvent   ┌──────────────┐
  │  Transport   │ ────────────────► │  ChatNode    │
  │ (TCP/memory) │ ◄──────────────── │ (dispatcher) │
  └──────────────┘   send_frame()    └──────────────┘
*/

pub mod errors;
pub mod memory;
pub mod tcp;

use crate::types::PeerId;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use errors::{TransportError, TransportResult};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;

/// Events a transport reports to the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection to `peer` is open; `inbound` is true when the peer dialed us
    Connected { peer: PeerId, inbound: bool },
    /// One complete frame from `peer`
    Frame { peer: PeerId, bytes: Vec<u8> },
    /// The connection to `peer` is gone
    Disconnected { peer: PeerId },
}

impl TransportEvent {
    pub fn peer(&self) -> &PeerId {
        match self {
            TransportEvent::Connected { peer, .. } => peer,
            TransportEvent::Frame { peer, .. } => peer,
            TransportEvent::Disconnected { peer } => peer,
        }
    }
}

/// Outbound half of a transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame to a connected peer.
    ///
    /// Returns `false` when the peer has no live connection or the write
    /// failed; never panics.
    async fn send_frame(&self, peer: &PeerId, frame: Vec<u8>) -> bool;
}

/// Inbound half of a transport: where `ChatNode::run` pulls events from
#[async_trait]
pub trait EventSource: Send {
    /// `None` once the transport has shut down
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<TransportEvent> {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.recv().await
    }
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<TransportEvent> {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.recv().await
    }
}
