//! Live peer sessions
//!
//! A session exists from the transport's connect event until its disconnect
//! event. Key material is not stored here; the crypto engine owns it.

use crate::types::PeerId;
use std::collections::HashMap;
use std::fmt;

/// Handshake progress of one connection. Variants are ordered; a session
/// only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeerState {
    /// Connection open, no HANDSHAKE yet
    Connecting,
    /// Display name known, no shared key yet
    Connected,
    KeysExchanged,
    Disconnected,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::KeysExchanged => "keys_exchanged",
            PeerState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession {
    pub peer_id: PeerId,
    pub display_name: Option<String>,
    pub state: PeerState,
    /// True when the peer dialed us
    pub inbound: bool,
}

impl PeerSession {
    pub fn display_name_or_unknown(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| "Unknown".to_string())
    }

    fn advance(&mut self, state: PeerState) {
        if state > self.state {
            self.state = state;
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    sessions: HashMap<PeerId, PeerSession>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session in `Connecting`. A stale session under the same id is replaced.
    pub fn open(&mut self, peer_id: &PeerId, inbound: bool) {
        self.sessions.insert(
            peer_id.clone(),
            PeerSession {
                peer_id: peer_id.clone(),
                display_name: None,
                state: PeerState::Connecting,
                inbound,
            },
        );
    }

    /// Record the name from HANDSHAKE and move to `Connected`; false if the
    /// peer has no open session
    pub fn record_handshake(&mut self, peer_id: &PeerId, display_name: String) -> bool {
        match self.sessions.get_mut(peer_id) {
            Some(session) => {
                session.display_name = Some(display_name);
                session.advance(PeerState::Connected);
                true
            }
            None => false,
        }
    }

    /// Mark the shared key as derived; false if the peer has no session
    pub fn mark_keys_exchanged(&mut self, peer_id: &PeerId) -> bool {
        match self.sessions.get_mut(peer_id) {
            Some(session) => {
                session.advance(PeerState::KeysExchanged);
                true
            }
            None => false,
        }
    }

    /// Remove the session; the returned copy is in `Disconnected`
    pub fn close(&mut self, peer_id: &PeerId) -> Option<PeerSession> {
        self.sessions.remove(peer_id).map(|mut session| {
            session.advance(PeerState::Disconnected);
            session
        })
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.sessions.contains_key(peer_id)
    }

    /// Peers that completed the handshake, sorted by id
    pub fn connected(&self) -> Vec<(PeerId, String)> {
        let mut peers: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.state >= PeerState::Connected)
            .map(|s| (s.peer_id.clone(), s.display_name_or_unknown()))
            .collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
