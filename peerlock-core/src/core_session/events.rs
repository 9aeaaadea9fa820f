//! Events the node reports to its embedding application

use crate::core_transfer::TransferDirection;
use crate::types::{GroupId, PeerId};
use tokio::sync::broadcast;

/// Observable outcome of inbound traffic or local actions
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// HANDSHAKE received; the application should now send its public key
    PeerConnected { peer_id: PeerId, display_name: String },
    PeerDisconnected { peer_id: PeerId, display_name: String },
    KeyExchanged { peer_id: PeerId },
    ChatReceived { peer_id: PeerId, text: String },
    FileProgress {
        peer_id: PeerId,
        filename: String,
        percent: f64,
        direction: TransferDirection,
    },
    /// Reassembled and opened under the sender's key
    FileReceived { peer_id: PeerId, filename: String, data: Vec<u8> },
    GroupInvited { group_id: GroupId, group_name: String, creator_id: PeerId },
    GroupMessageReceived { group_id: GroupId, sender: String, text: String },
    GroupMemberJoined { group_id: GroupId, peer_id: PeerId },
}

impl NodeEvent {
    /// Peer the event concerns, if any
    pub fn peer_id(&self) -> Option<&PeerId> {
        match self {
            NodeEvent::PeerConnected { peer_id, .. }
            | NodeEvent::PeerDisconnected { peer_id, .. }
            | NodeEvent::KeyExchanged { peer_id }
            | NodeEvent::ChatReceived { peer_id, .. }
            | NodeEvent::FileProgress { peer_id, .. }
            | NodeEvent::FileReceived { peer_id, .. }
            | NodeEvent::GroupMemberJoined { peer_id, .. } => Some(peer_id),
            NodeEvent::GroupInvited { .. } | NodeEvent::GroupMessageReceived { .. } => None,
        }
    }
}

/// Fan-out of node events to any number of subscribers
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<NodeEvent>,
}

impl EventBroadcaster {
    /// `capacity` events are buffered per subscriber before it starts lagging
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers reached; zero is not an error
    pub fn emit(&self, event: NodeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
