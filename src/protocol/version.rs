// Harbor Network Layer — Version Handshake
// Distributed under the MIT software license.

//! The two-sided version/verack exchange.
//!
//! Both directions may interleave; completion is the conjunction of
//! "got version" and "got verack". Capability messages (sendheaders,
//! sendaddrv2, wtxidrelay) piggyback on the exchange as sticky flags;
//! wtxidrelay is only honored between version and verack. A reject that
//! names our version is a terminal handshake failure.

use std::sync::{Arc, Mutex};

use super::ProtocolTimer;
use crate::config::now;
use crate::error::{Error, Result};
use crate::message::address::AddressItem;
use crate::message::reject::Reject;
use crate::message::version::{
    SendAddressV2, SendHeaders, Version, VersionAcknowledge, WitnessTxIdRelay,
};
use crate::net::channel::Channel;

/// Protocol level from which wtxidrelay may be negotiated (bip339).
const LEVEL_BIP339: u32 = 70016;

type Completion = Box<dyn FnOnce(Result<()>) + Send>;

#[derive(Default)]
struct State {
    got_version: bool,
    got_verack: bool,
    done: bool,
}

pub struct ProtocolVersion {
    channel: Arc<Channel>,
    state: Mutex<State>,
    completion: Mutex<Option<Completion>>,
    timer: ProtocolTimer,
}

impl ProtocolVersion {
    /// Run the handshake; the completion fires exactly once, on the
    /// channel strand, with `Ok(())` or the terminal code. The caller
    /// stops the channel on failure.
    pub fn start(channel: Arc<Channel>, completion: impl FnOnce(Result<()>) + Send + 'static) {
        let protocol = Arc::new(Self {
            timer: ProtocolTimer::new(&channel),
            channel: Arc::clone(&channel),
            state: Mutex::new(State::default()),
            completion: Mutex::new(Some(Box::new(completion))),
        });

        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        let timeout = self.channel.settings().handshake_timeout_secs();
        let timed = Arc::clone(&self);
        self.timer.reset(timeout, move |result| {
            if result.is_ok() {
                timed.complete(Err(Error::HandshakeTimeout));
            }
        });

        // The handshake fails with the channel if the channel goes first.
        let stopped = Arc::clone(&self);
        self.channel.subscribe_stop(move |notification| {
            if let Err(code) = notification {
                stopped.complete(Err(*code));
            }
        });

        let versioned = Arc::clone(&self);
        self.channel.subscribe::<Version>(self.channel.next_key(), move |notification| {
            match notification {
                Ok(message) => versioned.handle_version(message),
                Err(_) => false,
            }
        });

        let acknowledged = Arc::clone(&self);
        self.channel
            .subscribe::<VersionAcknowledge>(self.channel.next_key(), move |notification| {
                match notification {
                    Ok(_) => acknowledged.handle_verack(),
                    Err(_) => false,
                }
            });

        let headered = Arc::clone(&self);
        self.channel.subscribe::<SendHeaders>(self.channel.next_key(), move |_| {
            headered.channel.set_send_headers();
            false
        });

        let addressed = Arc::clone(&self);
        self.channel
            .subscribe::<SendAddressV2>(self.channel.next_key(), move |notification| {
                if notification.is_ok() && !addressed.state.lock().unwrap().got_verack {
                    addressed.channel.set_address_v2();
                }
                false
            });

        let witnessed = Arc::clone(&self);
        self.channel
            .subscribe::<WitnessTxIdRelay>(self.channel.next_key(), move |notification| {
                if notification.is_err() {
                    return false;
                }
                // Only honored between version and verack; early or late
                // announcements are ignored.
                let state = witnessed.state.lock().unwrap();
                if state.got_version && !state.got_verack {
                    drop(state);
                    witnessed.channel.set_witness_tx_id();
                    return false;
                }
                !state.done
            });

        let rejected = Arc::clone(&self);
        self.channel.subscribe::<Reject>(self.channel.next_key(), move |notification| {
            if let Ok(message) = notification {
                if message.is_version_reject() {
                    tracing::debug!(
                        "version rejected by {}: {}",
                        rejected.channel.authority(),
                        message.reason
                    );
                    rejected.complete(Err(Error::ProtocolViolation));
                    return false;
                }
                return !rejected.state.lock().unwrap().done;
            }
            false
        });

        self.send_version();
    }

    fn send_version(self: &Arc<Self>) {
        let settings = self.channel.settings();
        let message = Version {
            value: settings.protocol_maximum,
            services: settings.services_minimum,
            timestamp: now(),
            address_receiver: AddressItem::new(self.channel.authority(), 0, 0),
            address_sender: AddressItem::new(
                "[::]:0".parse().unwrap_or_else(|_| self.channel.authority()),
                0,
                settings.services_minimum,
            ),
            nonce: self.channel.nonce(),
            user_agent: settings.user_agent.clone(),
            start_height: settings.start_height,
            relay: settings.relay_transactions,
        };

        let sent = Arc::clone(self);
        self.channel.send(&message, move |result| {
            if let Err(code) = result {
                sent.complete(Err(code));
            }
        });
    }

    /// Returns false once terminal, detaching the handler.
    fn handle_version(self: &Arc<Self>, message: &Version) -> bool {
        let (done, duplicate) = {
            let state = self.state.lock().unwrap();
            (state.done, state.got_version)
        };
        if done {
            return false;
        }
        if duplicate {
            // A second version message is a protocol violation.
            self.complete(Err(Error::ProtocolViolation));
            return false;
        }

        // Loopback detection: the peer echoes our own identity.
        if message.nonce == self.channel.nonce() {
            tracing::debug!("loopback connection to {}", self.channel.authority());
            self.complete(Err(Error::SelfConnect));
            return false;
        }

        let settings = self.channel.settings();
        if message.value < settings.protocol_minimum {
            self.complete(Err(Error::InsufficientPeerVersion));
            return false;
        }

        if message.services & settings.services_minimum != settings.services_minimum {
            self.complete(Err(Error::InsufficientServices));
            return false;
        }

        self.channel.set_peer_version(message);
        self.state.lock().unwrap().got_version = true;

        tracing::debug!(
            "version {} from {} ({})",
            message.value,
            self.channel.authority(),
            message.user_agent
        );

        // Capability declarations must precede our verack.
        let negotiated = self.channel.negotiated_version();
        if settings.enable_address_v2 {
            self.channel.send(&SendAddressV2, |_| {});
        }
        if settings.enable_witness_tx && negotiated >= LEVEL_BIP339 {
            self.channel.send(&WitnessTxIdRelay, |_| {});
        }

        let acked = Arc::clone(self);
        self.channel.send(&VersionAcknowledge, move |result| {
            if let Err(code) = result {
                acked.complete(Err(code));
            }
        });

        self.try_complete();
        !self.state.lock().unwrap().done
    }

    fn handle_verack(self: &Arc<Self>) -> bool {
        let (done, duplicate) = {
            let mut state = self.state.lock().unwrap();
            let seen = (state.done, state.got_verack);
            if !state.done && !state.got_verack {
                state.got_verack = true;
            }
            seen
        };
        if done {
            return false;
        }
        if duplicate {
            self.complete(Err(Error::ProtocolViolation));
            return false;
        }

        self.try_complete();
        !self.state.lock().unwrap().done
    }

    /// Completion is the conjunction of both directions.
    fn try_complete(self: &Arc<Self>) {
        let ready = {
            let state = self.state.lock().unwrap();
            state.got_version && state.got_verack && !state.done
        };

        if ready {
            self.complete(Ok(()));
        }
    }

    /// Deliver the handshake result exactly once.
    fn complete(&self, result: Result<()>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.done {
                return;
            }
            state.done = true;
        }

        // Hold further reads until the session has attached the
        // steady-state protocols; an early frame would otherwise
        // dispatch into an empty distributor.
        if result.is_ok() {
            self.channel.pause();
        }

        self.timer.stop();
        if let Some(completion) = self.completion.lock().unwrap().take() {
            completion(result);
        }
    }
}
