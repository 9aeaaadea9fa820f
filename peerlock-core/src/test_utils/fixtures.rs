//! Running nodes on an in-memory network

use super::async_helpers::{wait_for_event, RecvTimeoutError, DEFAULT_TEST_TIMEOUT};
use crate::config::Config;
use crate::core_session::{ChatNode, NodeEvent};
use crate::core_transport::MemoryNetwork;
use crate::types::PeerId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A node with its dispatch loop running on a background task
pub struct TestNode {
    pub node: Arc<ChatNode>,
    pub events: broadcast::Receiver<NodeEvent>,
    task: JoinHandle<()>,
}

impl TestNode {
    pub fn id(&self) -> &PeerId {
        self.node.local_id()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Small chunks so multi-chunk transfers stay cheap in tests
pub fn test_config(display_name: &str) -> Config {
    let mut config = Config::default();
    config.node.display_name = display_name.to_string();
    config.node.event_capacity = 1024;
    config.transfer.chunk_size = 1024;
    config
}

/// Register `id` on `net` and start its dispatch loop
pub fn spawn_memory_node(net: &MemoryNetwork, id: &str, config: &Config) -> TestNode {
    let peer_id = PeerId::from(id);
    let (transport, inbox) = net.endpoint(peer_id.clone());
    let node = Arc::new(ChatNode::new(peer_id, config, Arc::new(transport)));
    let events = node.subscribe();

    let runner = Arc::clone(&node);
    let task = tokio::spawn(async move { runner.run(inbox).await });
    TestNode { node, events, task }
}

/// Link two running nodes and complete the key exchange in both directions
pub async fn connect_and_exchange_keys(
    net: &MemoryNetwork,
    a: &mut TestNode,
    b: &mut TestNode,
) -> Result<(), RecvTimeoutError> {
    let (a_id, b_id) = (a.id().clone(), b.id().clone());
    net.connect(&a_id, &b_id);

    wait_for_event(&mut a.events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::PeerConnected { peer_id, .. } if *peer_id == b_id)
    })
    .await?;
    wait_for_event(&mut b.events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::PeerConnected { peer_id, .. } if *peer_id == a_id)
    })
    .await?;

    a.node.send_public_key(&b_id).await;
    b.node.send_public_key(&a_id).await;

    wait_for_event(&mut a.events, DEFAULT_TEST_TIMEOUT, |e| {
        *e == NodeEvent::KeyExchanged { peer_id: b_id.clone() }
    })
    .await?;
    wait_for_event(&mut b.events, DEFAULT_TEST_TIMEOUT, |e| {
        *e == NodeEvent::KeyExchanged { peer_id: a_id.clone() }
    })
    .await?;
    Ok(())
}
