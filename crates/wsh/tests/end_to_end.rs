//! End-to-end scenarios exercising the kernel and virtual network stack as
//! a whole, rather than one module in isolation.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use wsh::{
    Backend, ByteStream, Cap, CapabilitySet, ChaosConfig, ChaosEngine, Clock, CreateTenantOptions,
    FixedClock, GatewayBackend, Kernel, Limits, SeededRng, StreamSocket, VirtualNetwork,
};

#[tokio::test]
async fn loopback_echo_round_trips_exact_bytes() {
    let network = VirtualNetwork::new();
    let listener = network.listen("mem://localhost:7000").await.unwrap();
    let client = network.connect("mem://localhost:7000").await.unwrap();

    client.write(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])).unwrap();
    let server = listener.accept().await.unwrap();
    let received = server.read().await.unwrap();
    server.write(received.clone()).unwrap();

    let echoed = client.read().await.unwrap();
    assert_eq!(echoed.as_ref(), [0xDE, 0xAD, 0xBE, 0xEF]);
}

#[tokio::test]
async fn scope_without_loopback_capability_denies_connect() {
    let network = VirtualNetwork::new();
    let scope = network.scope(CapabilitySet::new(Vec::<Cap>::new()), None);

    let err = scope.connect("mem://localhost:8000").await.unwrap_err();
    assert_eq!(err.code(), "EPOLICY");
    match err {
        wsh::NetError::PolicyDenied { capability, .. } => assert_eq!(capability, "loopback"),
        other => panic!("expected PolicyDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn ephemeral_listen_picks_a_port_in_range() {
    let network = VirtualNetwork::new();
    let listener = network.listen("mem://localhost:0").await.unwrap();
    assert!((49152..=65535).contains(&listener.local_port()));
}

#[test]
fn seeded_chaos_engine_reproduces_the_same_drop_sequence() {
    let run = || {
        let rng = Arc::new(SeededRng::new(999));
        let engine = ChaosEngine::new(rng);
        engine.configure(ChaosConfig {
            drop_rate: 0.5,
            ..Default::default()
        });
        (0..10).map(|_| engine.should_drop(None)).collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn fixed_clock_with_seeded_chaos_is_fully_deterministic() {
    let clock = FixedClock::new(0, 0);
    assert_eq!(clock.now_monotonic(), 0);
    assert_eq!(clock.now_wall(), 0);
    let rng = Arc::new(SeededRng::new(999));
    let engine = ChaosEngine::new(rng);
    engine.configure(ChaosConfig {
        drop_rate: 0.5,
        ..Default::default()
    });
    let a: Vec<bool> = (0..10).map(|_| engine.should_drop(None)).collect();
    let rng2 = Arc::new(SeededRng::new(999));
    let engine2 = ChaosEngine::new(rng2);
    engine2.configure(ChaosConfig {
        drop_rate: 0.5,
        ..Default::default()
    });
    let b: Vec<bool> = (0..10).map(|_| engine2.should_drop(None)).collect();
    assert_eq!(a, b);
}

#[test]
fn tenant_cleanup_empties_the_resource_table() {
    let kernel = Kernel::new(Limits::default());
    let tenant = kernel.create_tenant(CreateTenantOptions::default()).unwrap();

    let (a, _a_peer) = StreamSocket::create_pair(16);
    let (b, _b_peer) = StreamSocket::create_pair(16);
    kernel.allocate(wsh::Resource::Stream(a), &tenant.id).unwrap();
    kernel.allocate(wsh::Resource::Stream(b), &tenant.id).unwrap();
    assert_eq!(kernel.resources().list_by_owner(&tenant.id).len(), 2);

    kernel.destroy_tenant(&tenant.id).unwrap();
    assert!(kernel.resources().list_by_owner(&tenant.id).is_empty());
    assert_eq!(kernel.resources().size(), 0);
}

#[tokio::test]
async fn gateway_connect_times_out_when_transport_never_responds() {
    // The peer end is dropped without ever reading or writing, so the
    // gateway side never receives a reply frame.
    let (backend_side, _peer) = StreamSocket::create_pair(16);
    let transport: Arc<dyn ByteStream> = Arc::new(backend_side);
    let backend = GatewayBackend::with_timeout(transport, Duration::from_millis(100));
    backend.mark_authenticated().await;

    let started = std::time::Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(5), backend.connect("example.com", 80))
        .await
        .expect("the gateway itself must time out well within the test's own deadline")
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(err.code(), "ETIMEDOUT");
}
