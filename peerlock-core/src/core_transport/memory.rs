//! In-process transport
//!
//! A `MemoryNetwork` is a switchboard: nodes register an endpoint under
//! their id, then tests link and unlink pairs of endpoints. Each endpoint
//! receives its events on a single unbounded channel, which keeps frames
//! from any one sender in order.

use super::{Transport, TransportEvent};
use crate::types::PeerId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Default)]
struct Switchboard {
    endpoints: HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>,
    /// Unordered pairs stored as (min, max)
    links: HashSet<(PeerId, PeerId)>,
}

fn link_key(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Shared in-memory network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Switchboard>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and get its outbound handle plus event stream
    pub fn endpoint(&self, id: PeerId) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().endpoints.insert(id.clone(), tx);
        (MemoryTransport { local_id: id, network: self.clone() }, rx)
    }

    /// Open a link; `dialer` sees an outbound connection, `listener` an inbound one.
    ///
    /// Returns false if either endpoint is unknown or the link already exists.
    pub fn connect(&self, dialer: &PeerId, listener: &PeerId) -> bool {
        let mut board = self.lock();
        let (Some(dialer_tx), Some(listener_tx)) =
            (board.endpoints.get(dialer).cloned(), board.endpoints.get(listener).cloned())
        else {
            return false;
        };
        if !board.links.insert(link_key(dialer, listener)) {
            return false;
        }

        let _ = dialer_tx.send(TransportEvent::Connected { peer: listener.clone(), inbound: false });
        let _ = listener_tx.send(TransportEvent::Connected { peer: dialer.clone(), inbound: true });
        debug!(dialer = %dialer, listener = %listener, "Memory link opened");
        true
    }

    /// Close a link and notify both ends
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) -> bool {
        let mut board = self.lock();
        if !board.links.remove(&link_key(a, b)) {
            return false;
        }
        if let Some(tx) = board.endpoints.get(a) {
            let _ = tx.send(TransportEvent::Disconnected { peer: b.clone() });
        }
        if let Some(tx) = board.endpoints.get(b) {
            let _ = tx.send(TransportEvent::Disconnected { peer: a.clone() });
        }
        debug!(a = %a, b = %b, "Memory link closed");
        true
    }

    pub fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.lock().links.contains(&link_key(a, b))
    }

    /// Deliver raw bytes to `to` as if `from` had sent them, bypassing link checks
    pub fn inject(&self, from: &PeerId, to: &PeerId, bytes: Vec<u8>) -> bool {
        match self.lock().endpoints.get(to) {
            Some(tx) => tx.send(TransportEvent::Frame { peer: from.clone(), bytes }).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Switchboard> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outbound handle of one registered node
#[derive(Clone)]
pub struct MemoryTransport {
    local_id: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_frame(&self, peer: &PeerId, frame: Vec<u8>) -> bool {
        let board = self.network.lock();
        if !board.links.contains(&link_key(&self.local_id, peer)) {
            trace!(from = %self.local_id, to = %peer, "No memory link");
            return false;
        }
        match board.endpoints.get(peer) {
            Some(tx) => tx
                .send(TransportEvent::Frame { peer: self.local_id.clone(), bytes: frame })
                .is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_emits_both_directions() {
        let net = MemoryNetwork::new();
        let (a, b) = (PeerId::from("a"), PeerId::from("b"));
        let (_ta, mut rx_a) = net.endpoint(a.clone());
        let (_tb, mut rx_b) = net.endpoint(b.clone());

        assert!(net.connect(&a, &b));
        assert!(!net.connect(&b, &a), "link already open");

        assert_eq!(
            rx_a.recv().await.unwrap(),
            TransportEvent::Connected { peer: b.clone(), inbound: false }
        );
        assert_eq!(
            rx_b.recv().await.unwrap(),
            TransportEvent::Connected { peer: a.clone(), inbound: true }
        );
    }

    #[tokio::test]
    async fn test_frames_keep_order() {
        let net = MemoryNetwork::new();
        let (a, b) = (PeerId::from("a"), PeerId::from("b"));
        let (ta, _rx_a) = net.endpoint(a.clone());
        let (_tb, mut rx_b) = net.endpoint(b.clone());
        net.connect(&a, &b);
        let _ = rx_b.recv().await;

        for i in 0..50u8 {
            assert!(ta.send_frame(&b, vec![i]).await);
        }
        for i in 0..50u8 {
            match rx_b.recv().await.unwrap() {
                TransportEvent::Frame { peer, bytes } => {
                    assert_eq!(peer, a);
                    assert_eq!(bytes, vec![i]);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_without_link_fails() {
        let net = MemoryNetwork::new();
        let (a, b) = (PeerId::from("a"), PeerId::from("b"));
        let (ta, _rx_a) = net.endpoint(a.clone());
        let (_tb, _rx_b) = net.endpoint(b.clone());

        assert!(!ta.send_frame(&b, vec![1]).await);

        net.connect(&a, &b);
        assert!(ta.send_frame(&b, vec![1]).await);

        assert!(net.disconnect(&a, &b));
        assert!(!ta.send_frame(&b, vec![1]).await);
        assert!(!net.disconnect(&a, &b));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_both() {
        let net = MemoryNetwork::new();
        let (a, b) = (PeerId::from("a"), PeerId::from("b"));
        let (_ta, mut rx_a) = net.endpoint(a.clone());
        let (_tb, mut rx_b) = net.endpoint(b.clone());
        net.connect(&a, &b);
        let _ = rx_a.recv().await;
        let _ = rx_b.recv().await;

        net.disconnect(&b, &a);
        assert_eq!(rx_a.recv().await.unwrap(), TransportEvent::Disconnected { peer: b.clone() });
        assert_eq!(rx_b.recv().await.unwrap(), TransportEvent::Disconnected { peer: a.clone() });
        assert!(!net.is_linked(&a, &b));
    }
}
