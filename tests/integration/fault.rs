use crate::*;

use lateral_core::Message;
use lateral_discovery::Sender;

// ── Datagram fault helpers ──────────────────────────────────────────────────

/// Send raw bytes to the group, bypassing the codec.
pub fn send_raw(port: u16, bytes: &[u8]) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_multicast_loop_v4(true)?;
    socket.send_to(bytes, SocketAddrV4::new(GROUP, port))?;
    Ok(())
}

/// Garbage, truncated and unknown-type datagrams are skipped; the next
/// valid message still gets through.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_datagrams_do_not_stop_receiver() {
    const PORT: u16 = 46_030;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &[]);
    send_raw(PORT, b"\x00\xff garbage").unwrap();
    send_raw(PORT, br#"{"type":"PASSIVE","host":"#).unwrap();
    send_raw(PORT, br#"{"type":"SHOUT","requesterId":11}"#).unwrap();

    let sender = Sender::new(SocketAddrV4::new(GROUP, PORT), 1, None).unwrap();
    sender
        .passive_broadcast("x", 2002, &["r".to_string()], Some(NODE_B))
        .unwrap();

    let result = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_some()).await;
    node_a.shutdown();
    result.expect("valid message after garbage was lost");
}

/// Messages with no regions, and our own echoes, never reach listeners.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_and_echoed_messages_are_ignored() {
    const PORT: u16 = 46_031;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &["r"]);
    let listener = Arc::new(RecordingListener::default());
    node_a.add_listener(listener.clone());

    let sender = Sender::new(SocketAddrV4::new(GROUP, PORT), 1, None).unwrap();
    sender.send(&Message::passive("x", 2002, &[], NODE_B)).unwrap();
    sender
        .send(&Message::passive("x", 2003, &["r".to_string()], NODE_A))
        .unwrap();
    // Marker: once this arrives, the earlier two have been handled.
    sender
        .send(&Message::passive("x", 2004, &["r".to_string()], NODE_B))
        .unwrap();

    let result = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2004).is_some()).await;
    node_a.shutdown();
    result.expect("marker message never arrived");

    assert!(peer_on(&node_a, 2002).is_none());
    assert!(peer_on(&node_a, 2003).is_none());
    assert_eq!(listener.discovered_on(2002), 0);
    assert_eq!(listener.discovered_on(2003), 0);
    assert!(node_a.message_count() >= 3);
}
