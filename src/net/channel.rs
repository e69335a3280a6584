// Harbor Network Layer — Channel
// Distributed under the MIT software license.

//! One peer connection: framing, timers, identity, and negotiated state.
//!
//! A channel wraps a proxy and adds the per-connection identity (random
//! nonce, caller-assigned identifier), the expiration and inactivity
//! deadlines, and the feature state agreed during the handshake.
//!
//! Exactly-one-stop: the first `stop` wins; every later call is a no-op
//! and all subsequent completions carry the stop code. The cascade order
//! is socket, then timers, then subscribers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::distributor::{Routed, SubscriptionKey};
use super::proxy::Proxy;
use super::socket::Socket;
use crate::config::authority::Authority;
use crate::config::settings::Settings;
use crate::error::{Error, Result};
use crate::message::version::Version;
use crate::message::Payload;
use crate::runtime::deadline::Deadline;
use crate::runtime::strand::Strand;
use crate::runtime::subscriber::Notification;

/// Feature state agreed during the handshake. Strand-guarded.
#[derive(Debug, Clone)]
pub struct Negotiation {
    /// min(our maximum, peer's declared level); zero before the handshake.
    pub version: u32,
    pub services: u64,
    pub relay: bool,
    pub user_agent: String,
    pub start_height: u32,
    /// Sticky capability flags.
    pub address_v2: bool,
    pub witness_tx_id: bool,
    pub send_headers: bool,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self {
            version: 0,
            services: 0,
            relay: true,
            user_agent: String::new(),
            start_height: 0,
            address_v2: false,
            witness_tx_id: false,
            send_headers: false,
        }
    }
}

pub struct Channel {
    proxy: Arc<Proxy>,
    settings: Arc<Settings>,
    /// Local identity for loop detection; travels in our version message.
    nonce: u64,
    /// Caller-assigned identity within the owning session.
    identifier: u64,
    inbound: bool,
    /// Hard lifetime (germination for seed channels).
    lifetime: Duration,
    expiration: Arc<Deadline>,
    inactivity: Arc<Deadline>,
    negotiation: Mutex<Negotiation>,
    established: AtomicBool,
    keys: AtomicU64,
}

impl Channel {
    pub fn new(
        socket: Socket,
        settings: Arc<Settings>,
        identifier: u64,
        inbound: bool,
        lifetime: Duration,
    ) -> Arc<Self> {
        let proxy = Proxy::new(socket, &settings);
        let strand = proxy.strand().clone();

        let channel = Arc::new(Self {
            proxy,
            settings,
            nonce: rand::random(),
            identifier,
            inbound,
            lifetime,
            expiration: Deadline::new(strand.clone()),
            inactivity: Deadline::new(strand),
            negotiation: Mutex::new(Negotiation::default()),
            established: AtomicBool::new(false),
            keys: AtomicU64::new(1),
        });

        let fault = Arc::downgrade(&channel);
        channel.proxy.set_fault_hook(Arc::new(move |code| {
            if let Some(channel) = fault.upgrade() {
                channel.stop(code);
            }
        }));

        let activity = Arc::downgrade(&channel);
        channel.proxy.set_activity_hook(Arc::new(move || {
            if let Some(channel) = activity.upgrade() {
                channel.bump_activity();
            }
        }));

        channel
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    pub fn authority(&self) -> Authority {
        self.proxy.authority()
    }

    pub fn strand(&self) -> &Strand {
        self.proxy.strand()
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Fresh key for a distributor subscription.
    pub fn next_key(&self) -> SubscriptionKey {
        self.keys.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Arm the read loop, the expiration deadline, and the inactivity
    /// deadline.
    pub fn resume(self: &Arc<Self>) {
        let expired = Arc::downgrade(self);
        self.expiration.start(self.lifetime, move |result| {
            if result.is_ok()
                && let Some(channel) = expired.upgrade()
            {
                tracing::debug!("channel {} expired", channel.authority());
                channel.stop(Error::OperationTimeout);
            }
        });

        self.bump_activity();
        self.proxy.resume();
    }

    /// Hold reads after the in-flight frame. The handshake protocol
    /// pauses at completion so no steady-state frame dispatches before
    /// the session has attached subscribers for it.
    pub fn pause(&self) {
        self.proxy.pause();
    }

    /// Resume a paused read loop.
    pub fn resume_reading(&self) {
        self.proxy.resume_reading();
    }

    /// Restart the inactivity clock; every received frame lands here.
    fn bump_activity(self: &Arc<Self>) {
        let idled = Arc::downgrade(self);
        self.inactivity
            .start(self.settings.channel_inactivity_secs(), move |result| {
                if result.is_ok()
                    && let Some(channel) = idled.upgrade()
                {
                    tracing::debug!("channel {} inactive", channel.authority());
                    channel.stop(Error::PeerTimeout);
                }
            });
    }

    /// Stop the channel: socket, then timers, then subscribers, in that
    /// order. Idempotent; only the first code is reported.
    pub fn stop(&self, code: Error) {
        if !self.proxy.begin_stop(code) {
            return;
        }

        tracing::debug!("channel {} stopped: {}", self.authority(), code);
        self.expiration.stop();
        self.inactivity.stop();
        self.proxy.finish_stop(code);
    }

    pub fn is_stopped(&self) -> bool {
        self.proxy.is_stopped()
    }

    pub fn stop_code(&self) -> Error {
        self.proxy.stop_code()
    }

    // =========================================================================
    // MESSAGING
    // =========================================================================

    /// Queue a message; the completion runs on the channel strand.
    pub fn send<M: Payload>(&self, message: &M, handler: impl FnOnce(Result<()>) + Send + 'static) {
        self.proxy.send(message, handler);
    }

    /// Register a keyed handler for inbound `M`; safe from any context
    /// (dispatches to the strand when necessary).
    pub fn subscribe<M: Routed>(
        &self,
        key: SubscriptionKey,
        handler: impl FnMut(&Notification<M>) -> bool + Send + 'static,
    ) {
        let proxy = Arc::clone(&self.proxy);
        self.strand().dispatch(move || {
            proxy.subscribe_message(key, handler);
        });
    }

    pub fn unsubscribe<M: Routed>(&self, key: SubscriptionKey) {
        let proxy = Arc::clone(&self.proxy);
        self.strand().dispatch(move || {
            proxy.unsubscribe_message::<M>(key);
        });
    }

    /// Register for the terminal stop notification.
    pub fn subscribe_stop(&self, handler: impl FnMut(&Notification<()>) + Send + 'static) {
        let proxy = Arc::clone(&self.proxy);
        self.strand().dispatch(move || {
            proxy.subscribe_stop(handler);
        });
    }

    // =========================================================================
    // NEGOTIATION
    // =========================================================================

    /// Record the peer's version declaration and the level both sides
    /// will speak from now on.
    pub fn set_peer_version(&self, message: &Version) {
        let negotiated = self.settings.protocol_maximum.min(message.value);
        {
            let mut negotiation = self.negotiation.lock().unwrap();
            negotiation.version = negotiated;
            negotiation.services = message.services;
            negotiation.relay = message.relay;
            negotiation.user_agent = message.user_agent.clone();
            negotiation.start_height = message.start_height;
        }
        self.proxy.set_negotiated(negotiated);
    }

    pub fn negotiation(&self) -> Negotiation {
        self.negotiation.lock().unwrap().clone()
    }

    pub fn negotiated_version(&self) -> u32 {
        self.proxy.negotiated()
    }

    pub fn set_address_v2(&self) {
        self.negotiation.lock().unwrap().address_v2 = true;
    }

    pub fn set_witness_tx_id(&self) {
        self.negotiation.lock().unwrap().witness_tx_id = true;
    }

    pub fn set_send_headers(&self) {
        self.negotiation.lock().unwrap().send_headers = true;
    }

    /// Handshake completion latch; true exactly once.
    pub fn set_established(&self) -> bool {
        !self.established.swap(true, Ordering::SeqCst)
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ping::Ping;
    use std::sync::Mutex as StdMutex;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    async fn channel_pair(settings: Arc<Settings>) -> (Arc<Channel>, Arc<Channel>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let client = TcpStream::connect(address).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let handle = Handle::current();
        let make = |stream: TcpStream, identifier, inbound| {
            let socket = Socket::new(stream, Strand::new(&handle));
            Channel::new(socket, Arc::clone(&settings), identifier, inbound, Duration::from_secs(600))
        };

        (make(client, 1, false), make(server, 2, true))
    }

    #[tokio::test]
    async fn test_send_and_receive_one_frame() {
        let settings = Arc::new(Settings::default());
        let (alice, bob) = channel_pair(Arc::clone(&settings)).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        bob.subscribe::<Ping>(bob.next_key(), move |notification| {
            if let Ok(ping) = notification {
                tx.send(ping.nonce).unwrap();
            }
            true
        });

        alice.resume();
        bob.resume();

        // Drive the modern ping codec on both ends.
        alice.set_peer_version(&version_message(70016));
        bob.set_peer_version(&version_message(70016));

        alice.send(&Ping { nonce: 99 }, |result| assert!(result.is_ok()));
        assert_eq!(rx.recv().await, Some(99));

        alice.stop(Error::ChannelStopped);
        bob.stop(Error::ChannelStopped);
    }

    #[tokio::test]
    async fn test_stop_is_exactly_once_and_reaches_subscribers() {
        let settings = Arc::new(Settings::default());
        let (alice, _bob) = channel_pair(Arc::clone(&settings)).await;

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let stops = Arc::clone(&seen);
        alice.subscribe_stop(move |notification| {
            stops.lock().unwrap().push(notification.as_ref().err().copied());
        });

        alice.resume();
        alice.stop(Error::InvalidChecksum);
        alice.stop(Error::ChannelStopped); // no-op

        // Let the strand drain.
        alice.strand().run(|| ()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(Error::InvalidChecksum)]);
        assert!(alice.is_stopped());
        assert_eq!(alice.stop_code(), Error::InvalidChecksum);
    }

    #[tokio::test]
    async fn test_send_after_stop_completes_with_stop_code() {
        let settings = Arc::new(Settings::default());
        let (alice, _bob) = channel_pair(Arc::clone(&settings)).await;

        alice.resume();
        alice.stop(Error::ChannelStopped);

        let (tx, mut rx) = mpsc::unbounded_channel();
        alice.send(&Ping { nonce: 1 }, move |result| {
            tx.send(result).unwrap();
        });

        assert_eq!(rx.recv().await.unwrap(), Err(Error::ChannelStopped));
    }

    #[tokio::test]
    async fn test_negotiation_takes_minimum() {
        let settings = Arc::new(Settings::default());
        let (alice, _bob) = channel_pair(Arc::clone(&settings)).await;

        alice.set_peer_version(&version_message(60001));
        assert_eq!(alice.negotiated_version(), 60001);

        let negotiation = alice.negotiation();
        assert_eq!(negotiation.version, 60001);
        assert!(!negotiation.address_v2);

        alice.set_address_v2();
        assert!(alice.negotiation().address_v2);
    }

    fn version_message(value: u32) -> Version {
        use crate::message::address::{AddressItem, NODE_NETWORK};
        Version {
            value,
            services: NODE_NETWORK,
            timestamp: 0,
            address_receiver: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
            address_sender: AddressItem::new("0.0.0.0:0".parse().unwrap(), 0, 0),
            nonce: 7,
            user_agent: "/test/".to_string(),
            start_height: 0,
            relay: true,
        }
    }
}
