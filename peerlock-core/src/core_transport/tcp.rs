/*
  TcpTransport - raw TCP connections between nodes

  Commands (methods):
    - listen(addr)  -> spawns an accept loop, returns the bound address
    - dial(addr)    -> connects and returns the remote node id
    - send_frame()  -> writes one length-prefixed frame
    - close(peer)   -> shuts down our write half

  Events (mpsc):
    - Connected { peer, inbound } after the hello exchange
    - Frame { peer, bytes } for every frame read
    - Disconnected { peer } once, when the reader task ends

  Framing: u32 big-endian length prefix followed by the payload. The first
  frame in each direction is the sender's node id (the "hello"), so both
  ends key the connection by the other node's stable id.

  Each connection has one reader task, which keeps frames in order, and a
  writer behind a mutex so concurrent senders never interleave frames.
*/

use super::errors::{TransportError, TransportResult};
use super::{Transport, TransportEvent};
use crate::config::TransportConfig;
use crate::types::PeerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_SIZE: usize = 1024;

struct Connection {
    conn_id: u64,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

#[derive(Clone)]
pub struct TcpTransport {
    local_id: PeerId,
    config: TransportConfig,
    connections: Arc<Mutex<HashMap<PeerId, Connection>>>,
    next_conn_id: Arc<AtomicU64>,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl TcpTransport {
    /// Create a transport for the node `local_id` and its event stream
    pub fn new(local_id: PeerId, config: TransportConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let transport = TcpTransport {
            local_id,
            config,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_conn_id: Arc::new(AtomicU64::new(1)),
            event_tx,
        };
        (transport, event_rx)
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Bind `addr` and accept connections in the background
    pub async fn listen(&self, addr: &str) -> TransportResult<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Listening for peers");

        let transport = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, remote)) => {
                        if transport.event_tx.is_closed() {
                            break;
                        }
                        let transport = transport.clone();
                        tokio::spawn(async move {
                            if let Err(e) = transport.establish(socket, true).await {
                                warn!(remote = %remote, error = %e, "Inbound connection rejected");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Connect to `addr` and return the remote node id
    pub async fn dial(&self, addr: &str) -> TransportResult<PeerId> {
        let socket = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(format!("connecting to {}", addr)))??;
        info!(addr = %addr, "Connected to peer");
        self.establish(socket, false).await
    }

    /// Shut down the connection to `peer`; the reader task reports the disconnect
    pub async fn close(&self, peer: &PeerId) -> bool {
        let removed = self.connections.lock().await.remove(peer);
        match removed {
            Some(conn) => {
                let _ = conn.writer.lock().await.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Ids of peers with a live connection
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.connections.lock().await.keys().cloned().collect()
    }

    async fn establish(&self, socket: TcpStream, inbound: bool) -> TransportResult<PeerId> {
        let _ = socket.set_nodelay(true);
        let (mut reader, mut writer) = socket.into_split();

        write_frame(&mut writer, self.local_id.as_str().as_bytes()).await?;
        let hello = tokio::time::timeout(
            self.config.connect_timeout,
            read_frame(&mut reader, self.config.max_frame_size),
        )
        .await
        .map_err(|_| TransportError::Timeout("waiting for hello".to_string()))??
        .ok_or_else(|| TransportError::Hello("closed before hello".to_string()))?;

        let remote = String::from_utf8(hello)
            .map(PeerId)
            .map_err(|_| TransportError::Hello("node id is not UTF-8".to_string()))?;
        if remote.as_str().is_empty() || remote == self.local_id {
            return Err(TransportError::Hello(format!("unusable node id '{}'", remote)));
        }

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut connections = self.connections.lock().await;
            if connections.contains_key(&remote) {
                return Err(TransportError::DuplicatePeer(remote));
            }
            connections
                .insert(remote.clone(), Connection { conn_id, writer: Arc::new(Mutex::new(writer)) });
        }

        if self
            .event_tx
            .send(TransportEvent::Connected { peer: remote.clone(), inbound })
            .await
            .is_err()
        {
            warn!(peer = %remote, "Event receiver dropped");
        }

        let transport = self.clone();
        let peer = remote.clone();
        tokio::spawn(async move {
            transport.read_loop(peer, conn_id, reader).await;
        });

        debug!(peer = %remote, conn_id, inbound, "Connection established");
        Ok(remote)
    }

    async fn read_loop(&self, peer: PeerId, conn_id: u64, mut reader: OwnedReadHalf) {
        loop {
            match read_frame(&mut reader, self.config.max_frame_size).await {
                Ok(Some(bytes)) => {
                    if self
                        .event_tx
                        .send(TransportEvent::Frame { peer: peer.clone(), bytes })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(peer = %peer, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Dropping connection");
                    break;
                }
            }
        }

        {
            let mut connections = self.connections.lock().await;
            if connections.get(&peer).map(|c| c.conn_id) == Some(conn_id) {
                connections.remove(&peer);
            }
        }

        let _ = self.event_tx.send(TransportEvent::Disconnected { peer }).await;
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_frame(&self, peer: &PeerId, frame: Vec<u8>) -> bool {
        if frame.len() > self.config.max_frame_size {
            warn!(peer = %peer, size = frame.len(), "Refusing to send oversized frame");
            return false;
        }

        let writer = match self.connections.lock().await.get(peer) {
            Some(conn) => conn.writer.clone(),
            None => return false,
        };

        let mut writer = writer.lock().await;
        match write_frame(&mut *writer, &frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to write frame");
                false
            }
        }
    }
}

/// Write one length-prefixed frame
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> TransportResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| TransportError::FrameTooLarge { size: bytes.len(), max: u32::MAX as usize })?;
    writer.write_u32(len).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `Ok(None)` on a clean close before a new frame starts
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> TransportResult<Option<Vec<u8>>> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge { size: len, max: max_frame_size });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Event channel closed")
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"hello frame").await.unwrap();
        let frame = read_frame(&mut server, 1024).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"hello frame"[..]));

        drop(client);
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &[0u8; 64]).await.unwrap();
        let err = read_frame(&mut server, 16).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 64, max: 16 }));
    }

    #[tokio::test]
    async fn test_dial_exchanges_node_ids() {
        let (server, mut server_rx) = TcpTransport::new(PeerId::from("server"), TransportConfig::default());
        let (client, mut client_rx) = TcpTransport::new(PeerId::from("client"), TransportConfig::default());

        let addr = server.listen("127.0.0.1:0").await.unwrap();
        let remote = client.dial(&addr.to_string()).await.unwrap();
        assert_eq!(remote, PeerId::from("server"));

        assert_eq!(
            next_event(&mut client_rx).await,
            TransportEvent::Connected { peer: PeerId::from("server"), inbound: false }
        );
        assert_eq!(
            next_event(&mut server_rx).await,
            TransportEvent::Connected { peer: PeerId::from("client"), inbound: true }
        );

        assert!(client.send_frame(&PeerId::from("server"), b"ping".to_vec()).await);
        assert_eq!(
            next_event(&mut server_rx).await,
            TransportEvent::Frame { peer: PeerId::from("client"), bytes: b"ping".to_vec() }
        );
    }

    #[tokio::test]
    async fn test_close_reports_disconnect_on_both_sides() {
        let (server, mut server_rx) = TcpTransport::new(PeerId::from("s"), TransportConfig::default());
        let (client, mut client_rx) = TcpTransport::new(PeerId::from("c"), TransportConfig::default());

        let addr = server.listen("127.0.0.1:0").await.unwrap();
        client.dial(&addr.to_string()).await.unwrap();
        let _ = next_event(&mut client_rx).await;
        let _ = next_event(&mut server_rx).await;

        assert!(client.close(&PeerId::from("s")).await);
        assert_eq!(
            next_event(&mut server_rx).await,
            TransportEvent::Disconnected { peer: PeerId::from("c") }
        );
        assert_eq!(
            next_event(&mut client_rx).await,
            TransportEvent::Disconnected { peer: PeerId::from("s") }
        );
        assert!(!client.send_frame(&PeerId::from("s"), b"late".to_vec()).await);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let (transport, _rx) = TcpTransport::new(PeerId::from("solo"), TransportConfig::default());
        assert!(!transport.send_frame(&PeerId::from("nobody"), b"x".to_vec()).await);
    }

    #[tokio::test]
    async fn test_listen_invalid_address() {
        let (transport, _rx) = TcpTransport::new(PeerId::from("solo"), TransportConfig::default());
        assert!(transport.listen("invalid:address").await.is_err());
    }
}
