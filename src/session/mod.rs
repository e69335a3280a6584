// Harbor Network Layer — Sessions
// Distributed under the MIT software license.

//! Connection lifecycle owners.
//!
//! A session builds channels from accepted or dialed sockets, runs the
//! handshake on each, attaches the steady-state protocols exactly once
//! per successful handshake, and stops every channel it created when it
//! stops. Variants differ only in how sockets arrive and which
//! protocols attach.

pub mod inbound;
pub mod manual;
pub mod outbound;
pub mod seed;

pub use inbound::SessionInbound;
pub use manual::SessionManual;
pub use outbound::SessionOutbound;
pub use seed::SessionSeed;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

use crate::config::settings::LEVEL_BIP61;
use crate::error::{Error, Result};
use crate::net::acceptor::Acceptor;
use crate::net::channel::Channel;
use crate::net::connector::Connector;
use crate::net::network::NetworkContext;
use crate::net::socket::Socket;
use crate::protocol::address_in::{ProtocolAddressIn, ProtocolSeed};
use crate::protocol::address_out::ProtocolAddressOut;
use crate::protocol::ping::attach_ping;
use crate::protocol::reject::ProtocolReject;
use crate::protocol::version::ProtocolVersion;

/// Which protocol set attaches after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Keepalive, reject logging, and address gossip.
    Full,
    /// Keepalive and one-shot address harvesting.
    Seed,
}

/// Shared machinery for every session variant.
pub struct Session {
    context: Arc<NetworkContext>,
    kind: &'static str,
    attachment: Attachment,
    channels: Mutex<HashMap<u64, Arc<Channel>>>,
    acceptors: Mutex<Vec<Arc<Acceptor>>>,
    connectors: Mutex<Vec<Weak<Connector>>>,
    stop: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(
        context: Arc<NetworkContext>,
        kind: &'static str,
        attachment: Attachment,
    ) -> Arc<Self> {
        let (stop, _) = watch::channel(false);
        Arc::new(Self {
            context,
            kind,
            attachment,
            channels: Mutex::new(HashMap::new()),
            acceptors: Mutex::new(Vec::new()),
            connectors: Mutex::new(Vec::new()),
            stop,
        })
    }

    pub(crate) fn context(&self) -> &Arc<NetworkContext> {
        &self.context
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Sleep that wakes early on session stop; true when stopped.
    pub(crate) async fn sleep_or_stopped(&self, duration: Duration) -> bool {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            return true;
        }

        tokio::select! {
            _ = stop.changed() => true,
            _ = tokio::time::sleep(duration) => self.is_stopped(),
        }
    }

    pub(crate) fn track_acceptor(&self, acceptor: &Arc<Acceptor>) {
        self.acceptors.lock().unwrap().push(Arc::clone(acceptor));
    }

    pub(crate) fn track_connector(&self, connector: &Arc<Connector>) {
        let mut connectors = self.connectors.lock().unwrap();
        connectors.retain(|entry| entry.strong_count() > 0);
        connectors.push(Arc::downgrade(connector));
    }

    /// Factory: a channel with a freshly issued identifier.
    pub(crate) fn create_channel(
        &self,
        socket: Socket,
        inbound: bool,
        lifetime: Duration,
    ) -> Arc<Channel> {
        let identifier = self.context.next_channel_identifier();
        Channel::new(
            socket,
            Arc::clone(&self.context.settings),
            identifier,
            inbound,
            lifetime,
        )
    }

    /// Register, resume, and handshake a channel. On success the
    /// steady-state protocols attach (exactly once); on failure the
    /// channel is stopped with the handshake code.
    pub(crate) async fn start_channel(self: &Arc<Self>, channel: Arc<Channel>) -> Result<()> {
        if self.is_stopped() {
            channel.stop(Error::ChannelStopped);
            return Err(Error::ChannelStopped);
        }

        self.register(&channel);

        // Handshake subscriptions land on the strand before the read
        // loop can dispatch the peer's first frame.
        let (sender, receiver) = oneshot::channel();
        ProtocolVersion::start(Arc::clone(&channel), move |result| {
            let _ = sender.send(result);
        });
        channel.resume();

        match receiver.await {
            Ok(Ok(())) => {
                tracing::info!(
                    "{} peer {} established (version {}, {})",
                    self.kind,
                    channel.authority(),
                    channel.negotiated_version(),
                    channel.negotiation().user_agent
                );

                if channel.set_established() {
                    self.attach_protocols(&channel);
                    // Attachment jobs are queued on the strand; reads may
                    // flow again behind them.
                    channel.resume_reading();
                }
                Ok(())
            }
            Ok(Err(code)) => {
                tracing::debug!(
                    "{} handshake with {} failed: {}",
                    self.kind,
                    channel.authority(),
                    code
                );
                channel.stop(code);
                Err(code)
            }
            Err(_) => {
                let code = channel.stop_code();
                channel.stop(code);
                Err(code)
            }
        }
    }

    fn register(self: &Arc<Self>, channel: &Arc<Channel>) {
        let identifier = channel.identifier();
        self.channels
            .lock()
            .unwrap()
            .insert(identifier, Arc::clone(channel));

        let weak = Arc::downgrade(self);
        channel.subscribe_stop(move |_| {
            if let Some(session) = weak.upgrade() {
                session.channels.lock().unwrap().remove(&identifier);
            }
        });
    }

    /// Attach the variant's protocol set; runs once per channel, with
    /// every protocol start dispatched onto the channel strand.
    pub(crate) fn attach_protocols(&self, channel: &Arc<Channel>) {
        attach_ping(channel);

        match self.attachment {
            Attachment::Full => {
                if channel.negotiated_version() >= LEVEL_BIP61 {
                    ProtocolReject::start(Arc::clone(channel));
                }
                ProtocolAddressIn::start(
                    Arc::clone(channel),
                    Arc::clone(&self.context.hosts),
                    Arc::clone(&self.context.broadcast),
                );
                ProtocolAddressOut::start(
                    Arc::clone(channel),
                    Arc::clone(&self.context.hosts),
                    Arc::clone(&self.context.broadcast),
                );
            }
            Attachment::Seed => {
                ProtocolSeed::start(Arc::clone(channel), Arc::clone(&self.context.hosts));
            }
        }
    }

    /// Cancel outreach, stop every channel this session created.
    pub fn stop(&self) {
        if self.stop.send_replace(true) {
            return;
        }

        tracing::debug!("{} session stopping", self.kind);

        for acceptor in self.acceptors.lock().unwrap().drain(..) {
            acceptor.stop();
        }

        for connector in self.connectors.lock().unwrap().drain(..) {
            if let Some(connector) = connector.upgrade() {
                connector.stop();
            }
        }

        let channels: Vec<Arc<Channel>> =
            self.channels.lock().unwrap().drain().map(|(_, channel)| channel).collect();
        for channel in channels {
            channel.stop(Error::ChannelStopped);
        }
    }
}

/// Resolve when the channel stops (immediately if already stopped).
pub(crate) async fn wait_for_stop(channel: &Arc<Channel>) {
    let (sender, receiver) = oneshot::channel();
    let mut sender = Some(sender);
    channel.subscribe_stop(move |_| {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    });

    let _ = receiver.await;
}
