//! Lifecycle tests for `MulticastManager` over the in-memory network.
//!
//! All tests run on a paused clock, so backoffs and repeat delays are
//! measured exactly and cost no wall time.

mod support;

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use motion_protocol::{DeviceRegistry, HeartbeatSink};
use motion_transport::{
    AddressProvider, LinkState, MulticastConfig, MulticastManager, Scheduler,
};
use support::{wait_until, FixedAddress, MockNetwork, PRIMARY};

const HEARTBEAT: &str = r#"{"msgType":"Heartbeat","mac":"483fda1eb16e","deviceType":"22000000","data":{"operation":2,"direction":1,"currentPosition":99,"targetPosition":100,"currentState":3,"switchMode":0,"controlMode":0,"RSSI":-52}}"#;

struct Harness {
    manager: MulticastManager,
    network: MockNetwork,
    registry: Arc<DeviceRegistry>,
}

fn harness_with(address: Option<std::net::Ipv4Addr>) -> Harness {
    let network = MockNetwork::new();
    let registry = Arc::new(DeviceRegistry::new());
    let addresses: Arc<dyn AddressProvider> = Arc::new(FixedAddress(address));
    let sink: Arc<dyn HeartbeatSink> = registry.clone();
    let manager = MulticastManager::new(
        MulticastConfig::default(),
        addresses,
        Arc::new(network.clone()),
        sink,
        Scheduler::current(),
    );
    Harness {
        manager,
        network,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(Some(PRIMARY))
}

async fn started() -> Harness {
    let h = harness();
    h.manager.start();
    let manager = h.manager.clone();
    assert!(
        wait_until(Duration::from_secs(1), || manager.state() == LinkState::Running).await,
        "manager never reached Running"
    );
    h
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_opens_one_socket_on_primary_address() {
    let h = started().await;

    assert_eq!(h.network.opened(), 1);
    assert_eq!(h.network.interfaces(), vec![PRIMARY]);
    assert_eq!(h.manager.bound_interface(), Some(PRIMARY));
    assert!(h.manager.is_started());

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_is_delayed() {
    let h = harness();
    h.manager.start();

    assert_eq!(h.network.opened(), 0);
    assert_eq!(h.manager.state(), LinkState::Idle);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.network.opened(), 1);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_start_while_running_does_not_reopen() {
    let h = started().await;

    h.manager.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.network.opened(), 1);
    assert_eq!(h.manager.state(), LinkState::Running);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn no_primary_address_leaves_manager_idle() {
    let h = harness_with(None);
    h.manager.start();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.network.opened(), 0);
    assert_eq!(h.manager.state(), LinkState::Idle);
    assert!(!h.manager.is_started());
    assert_eq!(h.manager.counters().restarts, 0);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_open_can_be_retried_with_start() {
    let h = harness();
    h.network.refuse_open(true);
    h.manager.start();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.manager.state(), LinkState::Idle);
    assert_eq!(h.network.opened(), 0);

    h.network.refuse_open(false);
    h.manager.start();
    let manager = h.manager.clone();
    assert!(wait_until(Duration::from_secs(1), || manager.state() == LinkState::Running).await);
    assert_eq!(h.network.opened(), 1);

    h.manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Send path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn default_send_repeats_three_times_half_a_second_apart() {
    let h = started().await;

    assert!(h.manager.send(r#"{"msgType":"ReadDevice"}"#));

    let network = h.network.clone();
    assert!(wait_until(Duration::from_secs(5), || network.sent().len() == 3).await);

    let sent = h.network.sent();
    let target = SocketAddrV4::new("238.0.0.18".parse().unwrap(), 32100);
    for datagram in &sent {
        assert_eq!(datagram.target, target);
        assert_eq!(datagram.payload, br#"{"msgType":"ReadDevice"}"#);
    }
    for pair in sent.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(500));
    }

    // No trailing pause is held after the last repeat.
    assert!(h.manager.send_with_repeat("next", 1));
    let network = h.network.clone();
    assert!(wait_until(Duration::from_millis(50), || network.sent().len() == 4).await);

    assert_eq!(h.manager.counters().datagrams_sent, 4);
    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn zero_repeat_still_sends_once() {
    let h = started().await;

    assert!(h.manager.send_with_repeat("ping", 0));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.network.sent().len(), 1);
    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn outbound_queue_drops_past_capacity() {
    let h = harness();

    for i in 0..50 {
        assert!(h.manager.send(format!("request {i}")), "request {i} dropped");
    }
    assert!(!h.manager.send("one too many"));

    let counters = h.manager.counters();
    assert_eq!(counters.packets_queued, 50);
    assert_eq!(counters.packets_dropped, 1);
    assert_eq!(h.manager.outbound_len(), 50);
}

#[tokio::test(start_paused = true)]
async fn requests_queued_before_start_are_sent_after() {
    let h = harness();
    assert!(h.manager.send_with_repeat("early", 1));

    h.manager.start();
    let network = h.network.clone();
    assert!(wait_until(Duration::from_secs(1), || network.sent().len() == 1).await);
    assert_eq!(h.network.sent()[0].payload, b"early");

    h.manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Receive path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn heartbeat_updates_registry() {
    let h = started().await;

    assert!(h.network.deliver(HEARTBEAT));

    let registry = Arc::clone(&h.registry);
    assert!(wait_until(Duration::from_secs(1), || registry.len() == 1).await);

    let motor = h.registry.get("483fda1eb16e").expect("motor registered");
    assert_eq!(motor.device_type, "22000000");
    assert_eq!(motor.current_position, 99);
    assert_eq!(motor.rssi, -52);
    assert_eq!(h.manager.counters().heartbeats_applied, 1);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_message_is_skipped() {
    let h = started().await;

    assert!(h.network.deliver("{not json"));
    assert!(h.network.deliver(HEARTBEAT));

    let registry = Arc::clone(&h.registry);
    assert!(wait_until(Duration::from_secs(1), || registry.len() == 1).await);

    let counters = h.manager.counters();
    assert_eq!(counters.decode_errors, 1);
    assert_eq!(counters.datagrams_received, 2);
    assert_eq!(counters.restarts, 0);
    assert_eq!(h.network.opened(), 1);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn non_heartbeat_messages_are_ignored() {
    let h = started().await;

    assert!(h.network.deliver(r#"{"msgType":"WriteDeviceAck","mac":"aa"}"#));
    assert!(h.network.deliver(r#"{"mac":"bb"}"#));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.registry.is_empty());
    assert_eq!(h.manager.counters().decode_errors, 0);

    h.manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn receive_failure_reopens_after_backoff() {
    let h = started().await;
    let failed_at = tokio::time::Instant::now();

    assert!(h.network.fail_receive());

    let network = h.network.clone();
    assert!(wait_until(Duration::from_secs(3), || network.opened() == 2).await);
    assert!(failed_at.elapsed() >= Duration::from_secs(1));

    let manager = h.manager.clone();
    assert!(wait_until(Duration::from_secs(1), || manager.state() == LinkState::Running).await);
    assert_eq!(h.manager.counters().restarts, 1);

    // The new socket carries traffic.
    assert!(h.network.deliver(HEARTBEAT));
    let registry = Arc::clone(&h.registry);
    assert!(wait_until(Duration::from_secs(1), || registry.len() == 1).await);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn send_failure_abandons_remaining_repeats_and_restarts() {
    let h = started().await;
    h.network.fail_sends(true);

    assert!(h.manager.send("doomed"));

    let manager = h.manager.clone();
    assert!(wait_until(Duration::from_secs(3), || manager.counters().restarts == 1).await);

    assert_eq!(h.network.send_attempts(), 1);
    assert_eq!(h.network.opened(), 2);
    assert!(h.network.sent().is_empty());

    h.network.fail_sends(false);
    assert!(h.manager.send_with_repeat("after", 1));
    let network = h.network.clone();
    assert!(wait_until(Duration::from_secs(1), || network.sent().len() == 1).await);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn socket_closed_under_single_send_restarts() {
    let h = started().await;
    h.network.fail_sends(true);

    assert!(h.manager.send_with_repeat(r#"{"a":1}"#, 1));

    let manager = h.manager.clone();
    assert!(wait_until(Duration::from_secs(3), || manager.state() == LinkState::Running
        && manager.counters().restarts == 1)
    .await);
    assert!(h.network.send_attempts() <= 1);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restart_keeps_retrying_while_open_fails() {
    let h = started().await;
    h.network.refuse_open(true);

    assert!(h.network.fail_receive());
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(h.manager.state(), LinkState::Restarting);
    assert_eq!(h.network.opened(), 1);

    h.network.refuse_open(false);
    let manager = h.manager.clone();
    assert!(wait_until(Duration::from_secs(2), || manager.state() == LinkState::Running).await);
    assert_eq!(h.network.opened(), 2);
    assert_eq!(h.manager.counters().restarts, 1);

    h.manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_prevents_reopen() {
    let h = started().await;

    assert!(h.network.fail_receive());
    let manager = h.manager.clone();
    assert!(
        wait_until(Duration::from_millis(500), || manager.state() == LinkState::Restarting).await
    );

    h.manager.stop();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.network.opened(), 1);
    assert_eq!(h.manager.state(), LinkState::Stopped);
    assert_eq!(h.manager.counters().restarts, 0);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stop_closes_socket_and_halts_sending() {
    let h = started().await;

    h.manager.stop();
    assert_eq!(h.manager.state(), LinkState::Stopped);
    assert_eq!(h.manager.bound_interface(), None);

    h.manager.send_with_repeat("late", 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.network.sent().is_empty());
    assert_eq!(h.network.opened(), 1);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_after_stop_is_ignored() {
    let h = harness();
    h.manager.stop();
    h.manager.start();

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.network.opened(), 0);
    assert_eq!(h.manager.state(), LinkState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn shutdown_joins_every_task() {
    let h = started().await;
    assert!(h.manager.send("pending"));

    tokio::time::timeout(Duration::from_secs(5), h.manager.shutdown())
        .await
        .expect("shutdown should finish");
    assert_eq!(h.manager.state(), LinkState::Stopped);
}
