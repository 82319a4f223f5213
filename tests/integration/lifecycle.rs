use crate::*;

use lateral_discovery::{
    now_millis, DiscoveryManager, ServiceKey, ShutdownHooks, TokioScheduler,
};

/// The scheduled cleanup sweep reaps a peer that went silent.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduled_cleanup_reaps_silent_peer() {
    let mut attrs = attributes(46_020, 2001);
    attrs.service_address = "127.0.0.1".into();
    attrs.max_idle_secs = 1;
    let node = DiscoveryService::with_requester_id(attrs, NODE_A);
    let listener = Arc::new(RecordingListener::default());
    node.add_listener(listener.clone());

    node.add_or_update_peer(DiscoveredService::heard_at(
        "10.1.1.1",
        2002,
        vec!["r".into()],
        now_millis() - 5_000,
    ));
    node.add_or_update_peer(DiscoveredService::new("10.1.1.2", 2003, vec!["r".into()]));

    let scheduler = TokioScheduler::current();
    node.wire_scheduler(&scheduler);

    let result = wait_for_condition(Duration::from_secs(3), || peer_on(&node, 2002).is_none()).await;
    scheduler.shutdown();
    node.shutdown();

    result.expect("stale peer was never reaped");
    assert_eq!(listener.removed_on(2002), 1);
    assert_eq!(listener.removed_on(2003), 0);
}

/// The manager hands out one service per key and shuts them all down
/// through the registered hooks.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manager_deduplicates_and_shuts_down() {
    let manager = DiscoveryManager::new();
    let hooks = ShutdownHooks::new();
    let scheduler = TokioScheduler::current();

    let a = manager.get_or_create(&attributes(46_021, 2001), &[], &hooks, &scheduler);
    let again = manager.get_or_create(&attributes(46_021, 2001), &[], &hooks, &scheduler);
    let b = manager.get_or_create(&attributes(46_021, 2002), &[], &hooks, &scheduler);

    assert!(Arc::ptr_eq(&a, &again));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(manager.len(), 2);
    assert_eq!(hooks.len(), 2);
    assert_eq!(scheduler.task_count(), 4, "advertise and cleanup per service");
    assert!(manager.get(&ServiceKey::of(&attributes(46_021, 2003))).is_none());

    hooks.run();
    scheduler.shutdown();
    assert!(a.is_shutdown());
    assert!(b.is_shutdown());
}

/// Shutting a node down twice sends one remove broadcast.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_shutdown_sends_one_remove() {
    const PORT: u16 = 46_022;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &["r"]);
    let node_b = spawn_node(PORT, 2002, NODE_B, &["r"]);
    let listener = Arc::new(RecordingListener::default());
    node_a.add_listener(listener.clone());

    node_b.shutdown();
    node_b.shutdown();
    let result = wait_for_condition(Duration::from_secs(5), || listener.removed_on(2002) > 0).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    node_a.shutdown();

    result.expect("remove broadcast never arrived");
    assert_eq!(listener.removed_on(2002), 1);
}

/// Once shut down, a node stays gone even while the scheduler that
/// advertised it keeps running.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_node_stays_evicted_while_scheduler_runs() {
    const PORT: u16 = 46_023;
    if !skip_unless_ready(PORT) {
        return;
    }

    let node_a = spawn_node(PORT, 2001, NODE_A, &[]);
    let mut attrs = attributes(PORT, 2002);
    attrs.advertise_interval = Duration::from_millis(100);
    let node_b = DiscoveryService::with_requester_id(attrs, NODE_B);
    node_b.add_participating_region("r");
    node_b.startup();
    let scheduler = TokioScheduler::current();
    node_b.wire_scheduler(&scheduler);

    let discovered = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_some()).await;
    node_b.shutdown();
    let evicted = wait_for_condition(Duration::from_secs(5), || peer_on(&node_a, 2002).is_none()).await;

    // Several advertise periods pass with the scheduler still alive.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let present = peer_on(&node_a, 2002).is_some();

    scheduler.shutdown();
    node_a.shutdown();

    discovered.expect("A never discovered B");
    evicted.expect("A never evicted B");
    assert!(!present, "B came back after shutting down");
}
