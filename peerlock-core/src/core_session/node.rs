//! ChatNode: one local participant
//!
//! Owns the crypto engine, the session registry, the inbound file
//! assembler and the group table. Outbound operations live here; inbound
//! routing lives in `dispatcher.rs`.

use super::errors::SessionResult;
use super::events::{EventBroadcaster, NodeEvent};
use super::registry::{PeerRegistry, PeerState};
use crate::config::Config;
use crate::core_crypto::{CryptoEngine, NodeIdentity};
use crate::core_group::{GroupManager, GroupMembership};
use crate::core_protocol::Envelope;
use crate::core_transfer::{FileAssembler, OutboundTransfer, TransferDirection};
use crate::core_transport::Transport;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::types::{GroupId, PeerId};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one group fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<PeerId>,
    /// Members with no live connection; they simply miss the message
    pub unreachable: Vec<PeerId>,
}

pub struct ChatNode {
    pub(super) local_id: PeerId,
    pub(super) display_name: String,
    pub(super) chunk_size: usize,
    pub(super) crypto: CryptoEngine,
    pub(super) registry: RwLock<PeerRegistry>,
    pub(super) assembler: Mutex<FileAssembler>,
    pub(super) groups: RwLock<GroupManager>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) events: EventBroadcaster,
    pub(super) metrics: MetricsCollector,
}

impl ChatNode {
    /// Create a node with a fresh identity. `local_id` must be the id the
    /// transport announces to peers.
    pub fn new(local_id: PeerId, config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::with_identity(local_id, NodeIdentity::generate(), config, transport)
    }

    pub fn with_identity(
        local_id: PeerId,
        identity: NodeIdentity,
        config: &Config,
        transport: Arc<dyn Transport>,
    ) -> Self {
        info!(
            peer_id = %local_id,
            display_name = %config.node.display_name,
            "Node created"
        );
        Self {
            display_name: config.node.display_name.clone(),
            chunk_size: config.transfer.chunk_size,
            crypto: CryptoEngine::new(identity),
            registry: RwLock::new(PeerRegistry::new()),
            assembler: Mutex::new(FileAssembler::new(config.transfer.max_file_size)),
            groups: RwLock::new(GroupManager::new(local_id.clone())),
            transport,
            events: EventBroadcaster::new(config.node.event_capacity),
            metrics: MetricsCollector::new(),
            local_id,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn crypto(&self) -> &CryptoEngine {
        &self.crypto
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Peers that completed the handshake, as `(id, display name)`
    pub async fn connected_peers(&self) -> Vec<(PeerId, String)> {
        self.registry.read().await.connected()
    }

    pub async fn peer_display_name(&self, peer_id: &PeerId) -> Option<String> {
        self.registry.read().await.get(peer_id).and_then(|s| s.display_name.clone())
    }

    pub async fn peer_state(&self, peer_id: &PeerId) -> Option<PeerState> {
        self.registry.read().await.get(peer_id).map(|s| s.state)
    }

    pub async fn groups(&self) -> Vec<GroupMembership> {
        self.groups.read().await.groups()
    }

    pub async fn group(&self, group_id: &GroupId) -> Option<GroupMembership> {
        self.groups.read().await.get(group_id).cloned()
    }

    pub async fn inbound_transfers(&self) -> usize {
        self.assembler.lock().await.active_count()
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Encode and hand one envelope to the transport.
    ///
    /// Returns false when the peer has no session or the transport refuses.
    pub(super) async fn send_envelope(&self, peer_id: &PeerId, envelope: &Envelope) -> bool {
        if !self.registry.read().await.contains(peer_id) {
            debug!(peer_id = %peer_id, kind = %envelope.kind(), "Peer not connected");
            return false;
        }

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer_id = %peer_id, kind = %envelope.kind(), error = %e, "Failed to encode envelope");
                return false;
            }
        };

        if self.transport.send_frame(peer_id, frame).await {
            self.metrics.inc_sent();
            true
        } else {
            debug!(peer_id = %peer_id, kind = %envelope.kind(), "Transport refused envelope");
            false
        }
    }

    /// Publish our public key to `peer_id`
    pub async fn send_public_key(&self, peer_id: &PeerId) -> bool {
        let envelope = Envelope::public_key(self.crypto.export_public_key_base64());
        self.send_envelope(peer_id, &envelope).await
    }

    /// Send an encrypted chat message.
    ///
    /// `Ok(false)` if the peer is not connected; `KeyNotFound` if it is
    /// connected but no key has been exchanged yet.
    pub async fn send_chat(&self, peer_id: &PeerId, text: &str) -> SessionResult<bool> {
        if !self.registry.read().await.contains(peer_id) {
            return Ok(false);
        }
        let sealed = self.crypto.encrypt_for(peer_id, text.as_bytes())?;
        Ok(self.send_envelope(peer_id, &Envelope::chat(&sealed)).await)
    }

    /// Seal `data` under the peer key and stream it as FILE_START, chunks, FILE_END.
    ///
    /// Stops at the first chunk the transport refuses and returns `Ok(false)`.
    pub async fn send_file(&self, peer_id: &PeerId, filename: &str, data: &[u8]) -> SessionResult<bool> {
        if !self.registry.read().await.contains(peer_id) {
            return Ok(false);
        }
        let sealed = self.crypto.encrypt_for(peer_id, data)?;
        let transfer = OutboundTransfer::new(filename, sealed, self.chunk_size);
        info!(
            peer_id = %peer_id,
            filename = %filename,
            size = transfer.total_size(),
            chunks = transfer.chunk_count(),
            "Sending file"
        );

        if !self.send_envelope(peer_id, &transfer.start_envelope()).await {
            return Ok(false);
        }

        for (chunk, percent) in transfer.chunks() {
            if !self.send_envelope(peer_id, &chunk).await {
                warn!(peer_id = %peer_id, filename = %filename, percent, "File transfer interrupted");
                return Ok(false);
            }
            debug!(peer_id = %peer_id, filename = %filename, percent, "Sent chunk");
            self.events.emit(NodeEvent::FileProgress {
                peer_id: peer_id.clone(),
                filename: filename.to_string(),
                percent,
                direction: TransferDirection::Sent,
            });
        }

        Ok(self.send_envelope(peer_id, &transfer.end_envelope()).await)
    }

    /// Run `send_file` on its own task; the caller decides how many run at once
    pub fn spawn_file_transfer(
        self: &Arc<Self>,
        peer_id: PeerId,
        filename: String,
        data: Vec<u8>,
    ) -> JoinHandle<SessionResult<bool>> {
        let node = Arc::clone(self);
        tokio::spawn(async move { node.send_file(&peer_id, &filename, &data).await })
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create a group and invite `members`. Invites are fire-and-forget:
    /// unreachable members are logged and never retried.
    pub async fn create_group(
        &self,
        group_id: GroupId,
        name: &str,
        members: &[PeerId],
    ) -> SessionResult<GroupMembership> {
        let (membership, invites) =
            self.groups.write().await.create_group(&self.crypto, group_id, name, members)?;

        for (member, invite) in invites {
            if !self.send_envelope(&member, &invite).await {
                warn!(group_id = %membership.group_id, peer_id = %member, "Group invite not delivered");
            }
        }
        Ok(membership)
    }

    /// Encrypt once and send to every other member with a live connection
    pub async fn broadcast_to_group(&self, group_id: &GroupId, text: &str) -> SessionResult<BroadcastReport> {
        let broadcast = self.groups.read().await.seal_broadcast(
            &self.crypto,
            group_id,
            text.as_bytes(),
            &self.display_name,
        )?;
        self.metrics.inc_group_broadcasts();

        let mut report = BroadcastReport::default();
        for member in broadcast.recipients {
            if self.send_envelope(&member, &broadcast.envelope).await {
                report.delivered.push(member);
            } else {
                report.unreachable.push(member);
            }
        }

        debug!(
            group_id = %group_id,
            delivered = report.delivered.len(),
            unreachable = report.unreachable.len(),
            "Group broadcast sent"
        );
        Ok(report)
    }

    /// Tell the other members we are present; returns how many were reached
    pub async fn announce_join(&self, group_id: &GroupId) -> SessionResult<usize> {
        let recipients = self.groups.read().await.join_recipients(group_id)?;
        let envelope = Envelope::group_join(group_id.clone());

        let mut reached = 0;
        for member in recipients {
            if self.send_envelope(&member, &envelope).await {
                reached += 1;
            }
        }
        Ok(reached)
    }
}
