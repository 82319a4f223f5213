use crate::*;

use lateral_core::Message;
use lateral_discovery::{Sender, TokioScheduler};

/// A starts and requests; B, already advertising regionX, answers.
/// A ends up with exactly one entry for B.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_is_answered_with_passive() {
    const PORT: u16 = 46_010;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_b = spawn_node(PORT, 2002, NODE_B, &["regionX"]);
    // Construction of A sends the request broadcast.
    let node_a = spawn_node(PORT, 2001, NODE_A, &[]);

    let result = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_some()).await;

    node_a.shutdown();
    node_b.shutdown();
    result.expect("A never heard B's answer");

    let entries: Vec<_> = node_a
        .discovered_peers()
        .into_iter()
        .filter(|p| p.port == 2002)
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].region_names, vec!["regionX"]);
    assert!(peer_on(&node_a, 2001).is_none(), "A must not discover itself");
}

/// B shuts down and broadcasts REMOVE; A evicts B and each of A's listeners
/// hears about it once.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_broadcast_evicts_peer() {
    const PORT: u16 = 46_011;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &["regionX"]);
    let node_b = spawn_node(PORT, 2002, NODE_B, &["regionX"]);
    let listener = Arc::new(RecordingListener::default());
    node_a.add_listener(listener.clone());

    // B announces itself with a passive broadcast.
    node_b.service_request_broadcast();
    wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_some())
        .await
        .expect("A never learned of B");

    node_b.shutdown();
    let result = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_none()).await;
    // Let any straggling callbacks land before counting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    node_a.shutdown();

    result.expect("A never evicted B");
    assert_eq!(listener.removed_on(2002), 1);
}

/// Periodic advertisements propagate region changes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_periodic_advertisement_updates_regions() {
    const PORT: u16 = 46_012;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &[]);
    let mut attrs = attributes(PORT, 2002);
    attrs.advertise_interval = Duration::from_millis(200);
    let node_b = DiscoveryService::with_requester_id(attrs, NODE_B);
    node_b.add_participating_region("users");
    node_b.startup();

    let scheduler = TokioScheduler::current();
    node_b.wire_scheduler(&scheduler);

    let first = wait_for_condition(Duration::from_secs(5), || {
        peer_on(&node_a, 2002).is_some_and(|p| p.region_names == ["users"])
    })
    .await;

    node_b.add_participating_region("sessions");
    let second = wait_for_condition(Duration::from_secs(5), || {
        peer_on(&node_a, 2002).is_some_and(|p| p.region_names == ["users", "sessions"])
    })
    .await;

    scheduler.shutdown();
    node_a.shutdown();
    node_b.shutdown();

    first.expect("A never saw B's first advertisement");
    second.expect("A never saw B's updated regions");
    assert_eq!(node_a.discovered_peers().len(), 1);
}

/// A foreign datagram claiming to come from somewhere else is recorded
/// under its real source address.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_host_is_taken_from_packet_source() {
    const PORT: u16 = 46_013;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &[]);
    let sender = Sender::new(SocketAddrV4::new(GROUP, PORT), 1, None)
        .unwrap()
        .with_requester_id(NODE_B);
    sender
        .send(&Message::passive("203.0.113.99", 2002, &["r".to_string()], NODE_B))
        .unwrap();

    let result = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_some()).await;
    node_a.shutdown();
    result.unwrap();

    let peer = peer_on(&node_a, 2002).unwrap();
    assert_ne!(peer.address, "203.0.113.99");
    assert!(!peer.address.is_empty());
}
