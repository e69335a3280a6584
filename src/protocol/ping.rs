// Harbor Network Layer — Ping Protocols
// Distributed under the MIT software license.

//! Keepalive in two dialects keyed on the negotiated level.
//!
//! Pre-bip31 peers get a one-sided timer: we send empty pings and rely
//! on the channel inactivity deadline for liveness. From bip31 the ping
//! carries a nonce and the pong must echo it within the response
//! timeout; a mismatch or a silent peer stops the channel.

use std::sync::{Arc, Mutex};

use super::ProtocolTimer;
use crate::error::Error;
use crate::message::ping::{Ping, Pong};
use crate::net::channel::Channel;

/// Pre-bip31 keepalive: fire-and-forget pings on the interval.
pub struct ProtocolPingV1 {
    channel: Arc<Channel>,
    timer: ProtocolTimer,
}

impl ProtocolPingV1 {
    pub fn start(channel: Arc<Channel>) {
        let protocol = Arc::new(Self {
            timer: ProtocolTimer::new(&channel),
            channel: Arc::clone(&channel),
        });

        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        // Inbound pings need no response at this level; the subscription
        // exists so the frames count as activity and decode cleanly.
        self.channel
            .subscribe::<Ping>(self.channel.next_key(), |notification| notification.is_ok());

        let stopped = Arc::clone(&self);
        self.channel.subscribe_stop(move |_| stopped.timer.stop());

        self.rearm();
    }

    fn rearm(self: &Arc<Self>) {
        let interval = self.channel.settings().ping_interval_secs();
        let timed = Arc::clone(self);
        self.timer.reset(interval, move |result| {
            if result.is_err() || timed.channel.is_stopped() {
                return;
            }

            timed.channel.send(&Ping::default(), |_| {});
            timed.rearm();
        });
    }
}

/// bip31 keepalive: nonce round-trips under a response deadline.
pub struct ProtocolPingV2 {
    channel: Arc<Channel>,
    timer: ProtocolTimer,
    /// Nonce awaiting its pong, if a round-trip is outstanding.
    outstanding: Mutex<Option<u64>>,
}

impl ProtocolPingV2 {
    pub fn start(channel: Arc<Channel>) {
        let protocol = Arc::new(Self {
            timer: ProtocolTimer::new(&channel),
            channel: Arc::clone(&channel),
            outstanding: Mutex::new(None),
        });

        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        let pinged = Arc::clone(&self);
        self.channel.subscribe::<Ping>(self.channel.next_key(), move |notification| {
            match notification {
                Ok(message) => {
                    pinged.channel.send(&Pong { nonce: message.nonce }, |_| {});
                    true
                }
                Err(_) => false,
            }
        });

        let ponged = Arc::clone(&self);
        self.channel.subscribe::<Pong>(self.channel.next_key(), move |notification| {
            match notification {
                Ok(message) => ponged.handle_pong(message.nonce),
                Err(_) => false,
            }
        });

        let stopped = Arc::clone(&self);
        self.channel.subscribe_stop(move |_| stopped.timer.stop());

        self.rest();
    }

    /// Idle phase: wait out the ping interval.
    fn rest(self: &Arc<Self>) {
        let interval = self.channel.settings().ping_interval_secs();
        let timed = Arc::clone(self);
        self.timer.reset(interval, move |result| {
            if result.is_err() || timed.channel.is_stopped() {
                return;
            }

            timed.send_ping();
        });
    }

    /// Probe phase: a nonce is in flight under the response deadline.
    fn send_ping(self: &Arc<Self>) {
        let nonce: u64 = rand::random();
        *self.outstanding.lock().unwrap() = Some(nonce);

        self.channel.send(&Ping { nonce }, |_| {});

        let timeout = self.channel.settings().response_timeout_secs();
        let timed = Arc::clone(self);
        self.timer.reset(timeout, move |result| {
            if result.is_err() {
                return;
            }

            tracing::debug!("ping timeout from {}", timed.channel.authority());
            timed.channel.stop(Error::PeerTimeout);
        });
    }

    fn handle_pong(self: &Arc<Self>, nonce: u64) -> bool {
        let expected = self.outstanding.lock().unwrap().take();
        match expected {
            Some(expected) if expected == nonce => {
                self.rest();
                true
            }
            _ => {
                // An unsolicited or mismatched pong is a dead giveaway of
                // a confused or hostile peer.
                tracing::debug!("pong mismatch from {}", self.channel.authority());
                self.channel.stop(Error::PeerTimeout);
                false
            }
        }
    }
}

/// Pick the dialect for a channel's negotiated level.
pub fn attach_ping(channel: &Arc<Channel>) {
    if channel.negotiated_version() >= crate::config::settings::LEVEL_BIP31 {
        ProtocolPingV2::start(Arc::clone(channel));
    } else {
        ProtocolPingV1::start(Arc::clone(channel));
    }
}
