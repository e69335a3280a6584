//! Network integration tests: loopback handshakes, keepalive, and
//! address gossip between in-process nodes.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use harbor::config::now;
use harbor::error::Error;
use harbor::message::address::{AddressItem, NODE_NETWORK, NODE_WITNESS};
use harbor::message::ping::{Ping, Pong};
use harbor::message::version::Version;
use harbor::net::channel::Channel;
use harbor::net::socket::Socket;
use harbor::net::Network;
use harbor::protocol::ping::ProtocolPingV2;
use harbor::protocol::version::ProtocolVersion;
use harbor::runtime::strand::Strand;
use harbor::{Settings, TracingReporter};

/// Poll until the condition holds or the deadline passes.
async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn test_settings(name: &str) -> Settings {
    let mut settings = Settings::default();
    settings.outbound_connections = 0;
    settings.host_file_path =
        std::env::temp_dir().join(format!("harbor_{}_{}.hosts", name, std::process::id()));
    settings
}

async fn channel_pair(settings: Arc<Settings>) -> (Arc<Channel>, Arc<Channel>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let client = tokio::net::TcpStream::connect(address).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();

    let handle = Handle::current();
    let alice = Channel::new(
        Socket::new(client, Strand::new(&handle)),
        Arc::clone(&settings),
        1,
        false,
        Duration::from_secs(600),
    );
    let bob = Channel::new(
        Socket::new(server, Strand::new(&handle)),
        settings,
        2,
        true,
        Duration::from_secs(600),
    );

    (alice, bob)
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn test_two_sided_handshake_completes() {
    let settings = Arc::new(test_settings("handshake"));
    let (alice, bob) = channel_pair(Arc::clone(&settings)).await;

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    ProtocolVersion::start(Arc::clone(&alice), move |result| {
        alice_tx.send(result).unwrap();
    });
    let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
    ProtocolVersion::start(Arc::clone(&bob), move |result| {
        bob_tx.send(result).unwrap();
    });

    alice.resume();
    bob.resume();

    assert_eq!(alice_rx.recv().await.unwrap(), Ok(()));
    assert_eq!(bob_rx.recv().await.unwrap(), Ok(()));

    // Capabilities negotiated both ways.
    assert_eq!(alice.negotiated_version(), settings.protocol_maximum);
    assert!(alice.negotiation().address_v2);
    assert!(alice.negotiation().witness_tx_id);
    assert!(bob.negotiation().address_v2);

    alice.stop(Error::ChannelStopped);
    bob.stop(Error::ChannelStopped);
}

#[tokio::test]
async fn test_self_connect_is_rejected() {
    let settings = Arc::new(test_settings("selfconnect"));
    let (alice, bob) = channel_pair(Arc::clone(&settings)).await;

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    ProtocolVersion::start(Arc::clone(&alice), move |result| {
        alice_tx.send(result).unwrap();
    });

    alice.resume();
    bob.resume();

    // The "peer" echoes alice's own nonce, as a loopback would.
    let message = Version {
        value: settings.protocol_maximum,
        services: settings.services_minimum,
        timestamp: now(),
        address_receiver: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
        address_sender: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
        nonce: alice.nonce(),
        user_agent: "/loopback/".to_string(),
        start_height: 0,
        relay: true,
    };
    bob.send(&message, |_| {});

    assert_eq!(alice_rx.recv().await.unwrap(), Err(Error::SelfConnect));

    alice.stop(Error::SelfConnect);
    bob.stop(Error::ChannelStopped);
}

#[tokio::test]
async fn test_obsolete_peer_is_rejected() {
    let settings = Arc::new(test_settings("obsolete"));
    let (alice, bob) = channel_pair(Arc::clone(&settings)).await;

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    ProtocolVersion::start(Arc::clone(&alice), move |result| {
        alice_tx.send(result).unwrap();
    });

    alice.resume();
    bob.resume();

    let message = Version {
        value: settings.protocol_minimum - 1,
        services: settings.services_minimum,
        timestamp: now(),
        address_receiver: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
        address_sender: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
        nonce: 12345,
        user_agent: "/ancient/".to_string(),
        start_height: 0,
        relay: true,
    };
    bob.send(&message, |_| {});

    assert_eq!(
        alice_rx.recv().await.unwrap(),
        Err(Error::InsufficientPeerVersion)
    );

    alice.stop(Error::InsufficientPeerVersion);
    bob.stop(Error::ChannelStopped);
}

// =============================================================================
// KEEPALIVE
// =============================================================================

#[tokio::test]
async fn test_ping_round_trip_keeps_channel_alive() {
    let mut settings = test_settings("pingok");
    settings.ping_interval = 1;
    settings.response_timeout = 2;
    let settings = Arc::new(settings);

    let (alice, bob) = channel_pair(Arc::clone(&settings)).await;
    alice.resume();
    bob.resume();

    // Pretend the handshake negotiated a modern level on both ends.
    let version = sample_version(settings.protocol_maximum);
    alice.set_peer_version(&version);
    bob.set_peer_version(&version);

    // Bob answers pings by hand.
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let responder = Arc::clone(&bob);
    bob.subscribe::<Ping>(bob.next_key(), move |notification| {
        if let Ok(message) = notification {
            responder.send(&Pong { nonce: message.nonce }, |_| {});
            seen_tx.send(message.nonce).unwrap();
        }
        true
    });

    ProtocolPingV2::start(Arc::clone(&alice));

    // Two rounds answered, channel still up.
    assert!(seen_rx.recv().await.is_some());
    assert!(seen_rx.recv().await.is_some());
    assert!(!alice.is_stopped());

    alice.stop(Error::ChannelStopped);
    bob.stop(Error::ChannelStopped);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let mut settings = test_settings("pingdead");
    settings.ping_interval = 0; // probe immediately
    settings.response_timeout = 1;
    let settings = Arc::new(settings);

    let (alice, bob) = channel_pair(Arc::clone(&settings)).await;
    alice.resume();
    bob.resume();

    let version = sample_version(settings.protocol_maximum);
    alice.set_peer_version(&version);
    bob.set_peer_version(&version);

    // Bob consumes pings and never answers.
    bob.subscribe::<Ping>(bob.next_key(), |notification| notification.is_ok());

    ProtocolPingV2::start(Arc::clone(&alice));

    let stopped = wait_for(|| alice.is_stopped(), Duration::from_secs(5)).await;

    assert!(stopped, "silent peer should stop the channel");
    assert_eq!(alice.stop_code(), Error::PeerTimeout);

    bob.stop(Error::ChannelStopped);
}

// =============================================================================
// FULL NODES OVER LOOPBACK
// =============================================================================

#[tokio::test]
async fn test_inbound_and_manual_sessions_connect() {
    let mut listener_settings = test_settings("node_a");
    listener_settings.binds.push("127.0.0.1:0".parse().unwrap());
    let listener = Network::with_runtime(
        listener_settings,
        Handle::current(),
        Arc::new(TracingReporter),
    );
    listener.start().await.unwrap();

    let bound = listener.bound_authorities();
    assert_eq!(bound.len(), 1);

    let mut dialer_settings = test_settings("node_b");
    dialer_settings.peers.push(bound[0]);
    let dialer = Network::with_runtime(
        dialer_settings,
        Handle::current(),
        Arc::new(TracingReporter),
    );
    dialer.start().await.unwrap();

    let connected = wait_for(
        || listener.connection_count() >= 1 && dialer.connection_count() >= 1,
        Duration::from_secs(10),
    )
    .await;
    assert!(connected, "manual dialer should reach the listener");

    dialer.stop().await;
    listener.stop().await;

    let drained = wait_for(
        || listener.connection_count() == 0 && dialer.connection_count() == 0,
        Duration::from_secs(5),
    )
    .await;
    assert!(drained, "stop should cascade to every channel");
}

#[tokio::test]
async fn test_address_gossip_feeds_the_dialer_pool() {
    let mut listener_settings = test_settings("gossip_a");
    listener_settings.binds.push("127.0.0.1:0".parse().unwrap());
    let listener = Network::with_runtime(
        listener_settings,
        Handle::current(),
        Arc::new(TracingReporter),
    );
    listener.start().await.unwrap();

    // Give the listener something worth gossiping.
    let timestamp = now() as u32;
    let stored = listener
        .hosts()
        .store(vec![
            AddressItem::new("8.8.8.8:8333".parse().unwrap(), timestamp, NODE_NETWORK | NODE_WITNESS),
            AddressItem::new("9.9.9.9:8333".parse().unwrap(), timestamp, NODE_NETWORK),
            AddressItem::new("1.0.0.1:8333".parse().unwrap(), timestamp, NODE_NETWORK),
        ])
        .await;
    assert_eq!(stored.len(), 3);

    let mut dialer_settings = test_settings("gossip_b");
    dialer_settings.peers.push(listener.bound_authorities()[0]);
    let dialer = Network::with_runtime(
        dialer_settings,
        Handle::current(),
        Arc::new(TracingReporter),
    );
    dialer.start().await.unwrap();

    // The dialer's getaddr should pull the listener's sample into its pool.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut gossiped = false;
    while tokio::time::Instant::now() < deadline {
        if dialer.hosts().count().await >= 3 {
            gossiped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gossiped, "addr response should populate the dialer's pool");

    dialer.stop().await;
    listener.stop().await;

    // Clean stop persisted the dialer's pool to its hosts file.
    let saved = std::fs::read_to_string(&dialer.settings().host_file_path).unwrap();
    assert!(saved.lines().count() >= 3);

    std::fs::remove_file(&dialer.settings().host_file_path).ok();
    std::fs::remove_file(&listener.settings().host_file_path).ok();
}

fn sample_version(value: u32) -> Version {
    Version {
        value,
        services: NODE_NETWORK,
        timestamp: now(),
        address_receiver: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
        address_sender: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
        nonce: rand::random(),
        user_agent: "/test/".to_string(),
        start_height: 0,
        relay: true,
    }
}
