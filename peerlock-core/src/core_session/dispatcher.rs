/*
  Inbound dispatch

  TransportEvent::Connected    -> open session, send HANDSHAKE
  TransportEvent::Disconnected -> close session, drop keys and partial file
  TransportEvent::Frame        -> decode envelope, route by kind:

    handshake      -> registry (Connected)          -> PeerConnected
    public_key     -> crypto.import_peer_key        -> KeyExchanged
    chat           -> crypto.decrypt_from           -> ChatReceived
    file_start     -> assembler.start
    file_chunk     -> assembler.append              -> FileProgress
    file_end       -> assembler.finish, decrypt_from -> FileReceived
    group_invite   -> groups.handle_invite          -> GroupInvited
    group_message  -> groups.open_message           -> GroupMessageReceived
    group_join     -> groups.handle_join            -> GroupMemberJoined

  Nothing a peer sends can stop the loop: every failure is logged, counted
  and the envelope dropped.
*/

use super::events::NodeEvent;
use super::node::ChatNode;
use crate::core_protocol::encoding::{decode_bytes, decode_nonce};
use crate::core_protocol::{
    EncryptedBody, Envelope, EnvelopeKind, FileStartPayload, GroupInvitePayload,
    GroupMessagePayload, HandshakePayload, PublicKeyPayload,
};
use crate::core_transfer::TransferDirection;
use crate::core_transport::{EventSource, TransportEvent};
use crate::types::{GroupId, PeerId};
use std::fmt::Display;
use tracing::{debug, info, warn};

impl ChatNode {
    /// Process transport events until the source closes
    pub async fn run<S: EventSource>(&self, mut source: S) {
        info!(peer_id = %self.local_id, "Dispatch loop started");
        while let Some(event) = source.next_event().await {
            self.handle_transport_event(event).await;
        }
        info!(peer_id = %self.local_id, "Transport closed, dispatch loop stopped");
    }

    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { peer, inbound } => self.on_connected(peer, inbound).await,
            TransportEvent::Disconnected { peer } => self.on_disconnected(peer).await,
            TransportEvent::Frame { peer, bytes } => match Envelope::decode(&bytes) {
                Ok(envelope) => {
                    self.metrics.inc_received();
                    self.handle_envelope(&peer, envelope).await;
                }
                Err(e) => {
                    warn!(peer_id = %peer, error = %e, size = bytes.len(), "Dropping undecodable envelope");
                    self.metrics.inc_dropped();
                }
            },
        }
    }

    async fn on_connected(&self, peer: PeerId, inbound: bool) {
        info!(peer_id = %peer, inbound, "Peer connection opened");
        self.registry.write().await.open(&peer, inbound);

        let handshake = Envelope::handshake(self.display_name.clone());
        if !self.send_envelope(&peer, &handshake).await {
            warn!(peer_id = %peer, "Failed to send handshake");
        }
    }

    async fn on_disconnected(&self, peer: PeerId) {
        let session = self.registry.write().await.close(&peer);
        self.crypto.remove_peer(&peer);
        if let Some(partial) = self.assembler.lock().await.abandon(&peer) {
            info!(
                peer_id = %peer,
                filename = %partial.filename(),
                received = partial.received(),
                "Discarding unfinished transfer"
            );
        }

        match session {
            Some(session) => {
                let display_name = session.display_name_or_unknown();
                info!(peer_id = %peer, display_name = %display_name, "Peer disconnected");
                self.events.emit(NodeEvent::PeerDisconnected { peer_id: peer, display_name });
            }
            None => debug!(peer_id = %peer, "Disconnect for unknown peer"),
        }
    }

    async fn handle_envelope(&self, peer: &PeerId, envelope: Envelope) {
        debug!(peer_id = %peer, kind = %envelope.kind(), "Envelope received");
        match envelope {
            Envelope::Handshake(payload) => self.on_handshake(peer, payload).await,
            Envelope::PublicKey(payload) => self.on_public_key(peer, payload).await,
            Envelope::Chat(body) => self.on_chat(peer, body),
            Envelope::FileStart(payload) => self.on_file_start(peer, payload).await,
            Envelope::FileChunk(payload) => self.on_file_chunk(peer, &payload.data).await,
            Envelope::FileEnd(_) => self.on_file_end(peer).await,
            Envelope::GroupInvite(payload) => self.on_group_invite(peer, payload).await,
            Envelope::GroupMessage(payload) => self.on_group_message(peer, payload).await,
            Envelope::GroupJoin(payload) => self.on_group_join(peer, payload.group_id).await,
        }
    }

    async fn on_handshake(&self, peer: &PeerId, payload: HandshakePayload) {
        let display_name = payload.username;
        if !self.registry.write().await.record_handshake(peer, display_name.clone()) {
            return self.drop_envelope(peer, EnvelopeKind::Handshake, "no open connection");
        }
        info!(peer_id = %peer, display_name = %display_name, "Handshake received");
        self.events.emit(NodeEvent::PeerConnected { peer_id: peer.clone(), display_name });
    }

    async fn on_public_key(&self, peer: &PeerId, payload: PublicKeyPayload) {
        if let Err(e) = self.crypto.import_peer_key(peer, payload.public_key.as_bytes()) {
            self.drop_envelope(peer, EnvelopeKind::PublicKey, e);
            return;
        }
        self.registry.write().await.mark_keys_exchanged(peer);
        info!(peer_id = %peer, "Key exchange complete");
        self.events.emit(NodeEvent::KeyExchanged { peer_id: peer.clone() });
    }

    fn on_chat(&self, peer: &PeerId, body: EncryptedBody) {
        let (nonce, ciphertext) = match body.decode() {
            Ok(parts) => parts,
            Err(e) => return self.drop_envelope(peer, EnvelopeKind::Chat, e),
        };
        let plaintext = match self.crypto.decrypt_from(peer, &nonce, &ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => return self.reject_ciphertext(peer, EnvelopeKind::Chat, e),
        };
        match String::from_utf8(plaintext) {
            Ok(text) => {
                self.events.emit(NodeEvent::ChatReceived { peer_id: peer.clone(), text });
            }
            Err(e) => self.drop_envelope(peer, EnvelopeKind::Chat, e),
        }
    }

    async fn on_file_start(&self, peer: &PeerId, payload: FileStartPayload) {
        let nonce = match decode_nonce(&payload.nonce) {
            Ok(nonce) => nonce,
            Err(e) => return self.drop_envelope(peer, EnvelopeKind::FileStart, e),
        };
        let (filename, size) = (payload.filename, payload.filesize);
        match self.assembler.lock().await.start(peer, filename.clone(), size, nonce) {
            Ok(()) => info!(peer_id = %peer, filename = %filename, size, "Receiving file"),
            Err(e) => self.drop_envelope(peer, EnvelopeKind::FileStart, e),
        }
    }

    async fn on_file_chunk(&self, peer: &PeerId, data: &str) {
        let bytes = match decode_bytes("data", data) {
            Ok(bytes) => bytes,
            Err(e) => return self.drop_envelope(peer, EnvelopeKind::FileChunk, e),
        };
        let progress = self.assembler.lock().await.append(peer, &bytes);
        match progress {
            Ok(progress) => {
                debug!(
                    peer_id = %peer,
                    filename = %progress.filename,
                    received = progress.received,
                    total = progress.total,
                    "Received chunk"
                );
                self.events.emit(NodeEvent::FileProgress {
                    peer_id: peer.clone(),
                    filename: progress.filename,
                    percent: progress.percent,
                    direction: TransferDirection::Received,
                });
            }
            Err(e) => self.drop_envelope(peer, EnvelopeKind::FileChunk, e),
        }
    }

    async fn on_file_end(&self, peer: &PeerId) {
        let finished = self.assembler.lock().await.finish(peer);
        match finished {
            // Opened here: the sender's key is removed as soon as it disconnects
            Ok(done) => match self.crypto.decrypt_from(peer, &done.nonce, &done.ciphertext) {
                Ok(data) => {
                    info!(peer_id = %peer, filename = %done.filename, size = data.len(), "File received");
                    self.metrics.inc_files_received();
                    self.events.emit(NodeEvent::FileReceived {
                        peer_id: peer.clone(),
                        filename: done.filename,
                        data,
                    });
                }
                Err(e) => self.reject_ciphertext(peer, EnvelopeKind::FileEnd, e),
            },
            Err(e) => self.drop_envelope(peer, EnvelopeKind::FileEnd, e),
        }
    }

    async fn on_group_invite(&self, peer: &PeerId, payload: GroupInvitePayload) {
        let joined = self.groups.write().await.handle_invite(&self.crypto, payload);
        match joined {
            Ok(membership) => {
                info!(
                    peer_id = %peer,
                    group_id = %membership.group_id,
                    group_name = %membership.name,
                    "Invited to group"
                );
                self.events.emit(NodeEvent::GroupInvited {
                    group_id: membership.group_id,
                    group_name: membership.name,
                    creator_id: membership.creator_id,
                });
            }
            Err(e) => self.drop_envelope(peer, EnvelopeKind::GroupInvite, e),
        }
    }

    async fn on_group_message(&self, peer: &PeerId, payload: GroupMessagePayload) {
        let opened = self.groups.read().await.open_message(&self.crypto, &payload);
        let plaintext = match opened {
            Ok(plaintext) => plaintext,
            Err(e) => return self.reject_ciphertext(peer, EnvelopeKind::GroupMessage, e),
        };
        match String::from_utf8(plaintext) {
            Ok(text) => {
                self.events.emit(NodeEvent::GroupMessageReceived {
                    group_id: payload.group_id,
                    sender: payload.sender,
                    text,
                });
            }
            Err(e) => self.drop_envelope(peer, EnvelopeKind::GroupMessage, e),
        }
    }

    async fn on_group_join(&self, peer: &PeerId, group_id: GroupId) {
        let joined = self.groups.write().await.handle_join(&group_id, peer);
        match joined {
            Ok(true) => {
                self.events.emit(NodeEvent::GroupMemberJoined { group_id, peer_id: peer.clone() });
            }
            Ok(false) => debug!(peer_id = %peer, group_id = %group_id, "Already a member"),
            Err(e) => self.drop_envelope(peer, EnvelopeKind::GroupJoin, e),
        }
    }

    fn drop_envelope(&self, peer: &PeerId, kind: EnvelopeKind, reason: impl Display) {
        warn!(peer_id = %peer, kind = %kind, reason = %reason, "Dropping envelope");
        self.metrics.inc_dropped();
    }

    fn reject_ciphertext(&self, peer: &PeerId, kind: EnvelopeKind, reason: impl Display) {
        warn!(peer_id = %peer, kind = %kind, reason = %reason, "Failed to decrypt payload");
        self.metrics.inc_decrypt_failures();
    }
}
