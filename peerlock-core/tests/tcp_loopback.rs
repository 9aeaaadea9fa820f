/*
    tcp_loopback.rs - Two nodes over real TCP on 127.0.0.1
*/

use peerlock_core::config::TransportConfig;
use peerlock_core::core_transport::TcpTransport;
use peerlock_core::test_utils::{test_config, wait_for_event, DEFAULT_TEST_TIMEOUT};
use peerlock_core::{ChatNode, NodeEvent, PeerId};
use std::sync::Arc;

fn tcp_node(id: &str, name: &str) -> (Arc<ChatNode>, TcpTransport) {
    let peer_id = PeerId::from(id);
    let (transport, inbox) = TcpTransport::new(peer_id.clone(), TransportConfig::default());
    let node = Arc::new(ChatNode::new(peer_id, &test_config(name), Arc::new(transport.clone())));
    let runner = Arc::clone(&node);
    tokio::spawn(async move { runner.run(inbox).await });
    (node, transport)
}

#[tokio::test]
async fn test_chat_and_file_over_tcp() {
    let (server, server_transport) = tcp_node("server-id", "server");
    let (client, client_transport) = tcp_node("client-id", "client");
    let mut server_events = server.subscribe();
    let mut client_events = client.subscribe();

    let addr = server_transport.listen("127.0.0.1:0").await.unwrap();
    let remote = client_transport.dial(&addr.to_string()).await.unwrap();
    assert_eq!(remote, PeerId::from("server-id"));

    wait_for_event(&mut client_events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::PeerConnected { display_name, .. } if display_name == "server")
    })
    .await
    .unwrap();
    wait_for_event(&mut server_events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::PeerConnected { display_name, .. } if display_name == "client")
    })
    .await
    .unwrap();

    assert!(client.send_public_key(&remote).await);
    assert!(server.send_public_key(&PeerId::from("client-id")).await);
    wait_for_event(&mut client_events, DEFAULT_TEST_TIMEOUT, |e| matches!(e, NodeEvent::KeyExchanged { .. }))
        .await
        .unwrap();
    wait_for_event(&mut server_events, DEFAULT_TEST_TIMEOUT, |e| matches!(e, NodeEvent::KeyExchanged { .. }))
        .await
        .unwrap();

    assert!(client.send_chat(&remote, "over the wire").await.unwrap());
    let chat = wait_for_event(&mut server_events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::ChatReceived { .. })
    })
    .await
    .unwrap();
    assert_eq!(
        chat,
        NodeEvent::ChatReceived { peer_id: PeerId::from("client-id"), text: "over the wire".into() }
    );

    let data = vec![0x5Au8; 10_000];
    assert!(client.send_file(&remote, "pattern.bin", &data).await.unwrap());
    let file = wait_for_event(&mut server_events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::FileReceived { .. })
    })
    .await
    .unwrap();
    assert_eq!(
        file,
        NodeEvent::FileReceived { peer_id: PeerId::from("client-id"), filename: "pattern.bin".into(), data }
    );

    assert!(client_transport.close(&remote).await);
    let gone = wait_for_event(&mut server_events, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, NodeEvent::PeerDisconnected { .. })
    })
    .await
    .unwrap();
    assert_eq!(
        gone,
        NodeEvent::PeerDisconnected { peer_id: PeerId::from("client-id"), display_name: "client".into() }
    );
}
