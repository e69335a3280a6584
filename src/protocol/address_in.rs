// Harbor Network Layer — Address Intake
// Distributed under the MIT software license.

//! Inbound address gossip: solicit, filter, rate-limit, store, announce.
//!
//! One getaddr goes out at attach; the first addr per channel may be the
//! full initial dump, later messages are capped to the unsolicited
//! quota and drained through a token bucket. Accepted entries feed the
//! pool and are announced on the network bus for relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::message::address::{Address, AddressItem, GetAddress};
use crate::message::MAX_ADVERTISEMENT;
use crate::net::broadcast::Broadcast;
use crate::net::channel::Channel;
use crate::net::hosts::HostPool;
use crate::net::rate_limit::TokenBucket;

/// Intake budget: the initial dump passes in one burst, steady state
/// accrues six entries a minute.
const INTAKE_BURST: u32 = 1_000;
const INTAKE_PER_MINUTE: u32 = 6;

pub struct ProtocolAddressIn {
    channel: Arc<Channel>,
    hosts: Arc<HostPool>,
    broadcast: Arc<Broadcast>,
    budget: Mutex<TokenBucket>,
    /// True until the initial dump has been consumed.
    first: AtomicBool,
}

impl ProtocolAddressIn {
    pub fn start(channel: Arc<Channel>, hosts: Arc<HostPool>, broadcast: Arc<Broadcast>) {
        let protocol = Arc::new(Self {
            channel: Arc::clone(&channel),
            hosts,
            broadcast,
            budget: Mutex::new(TokenBucket::new(INTAKE_BURST, INTAKE_PER_MINUTE)),
            first: AtomicBool::new(true),
        });

        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        let received = Arc::clone(&self);
        self.channel.subscribe::<Address>(self.channel.next_key(), move |notification| {
            match notification {
                Ok(message) => {
                    received.handle_address(&message.addresses);
                    true
                }
                Err(_) => false,
            }
        });

        // Solicit the peer's initial dump.
        self.channel.send(&GetAddress, |_| {});
    }

    fn handle_address(self: &Arc<Self>, addresses: &[AddressItem]) {
        let mut items = addresses.to_vec();

        let first = self.first.swap(false, Ordering::SeqCst);
        if !first && items.len() > MAX_ADVERTISEMENT {
            tracing::debug!(
                "unsolicited addr burst from {} ({} entries)",
                self.channel.authority(),
                items.len()
            );
            items.truncate(MAX_ADVERTISEMENT);
        }

        let allowed = self.budget.lock().unwrap().admit(items.len());
        items.truncate(allowed);
        if items.is_empty() {
            return;
        }

        let this = Arc::clone(self);
        self.channel.strand().handle().spawn(async move {
            let accepted = this.hosts.store(items).await;
            if accepted.is_empty() {
                return;
            }

            tracing::debug!(
                "accepted {} addresses from {}",
                accepted.len(),
                this.channel.authority()
            );

            let sender = this.channel.identifier();
            for item in accepted {
                this.broadcast.notify(item, sender);
            }
        });
    }
}

/// Seed-session variant: harvest one addr payload, feed the pool, and
/// hang up. The channel's germination deadline bounds the wait.
pub struct ProtocolSeed {
    channel: Arc<Channel>,
    hosts: Arc<HostPool>,
}

impl ProtocolSeed {
    pub fn start(channel: Arc<Channel>, hosts: Arc<HostPool>) {
        let protocol = Arc::new(Self { channel: Arc::clone(&channel), hosts });
        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        let received = Arc::clone(&self);
        self.channel.subscribe::<Address>(self.channel.next_key(), move |notification| {
            if let Ok(message) = notification {
                received.harvest(message.addresses.clone());
            }
            false
        });

        self.channel.send(&GetAddress, |_| {});
    }

    fn harvest(self: &Arc<Self>, items: Vec<AddressItem>) {
        let this = Arc::clone(self);
        self.channel.strand().handle().spawn(async move {
            let accepted = this.hosts.store(items).await;
            tracing::info!(
                "seed {} yielded {} addresses",
                this.channel.authority(),
                accepted.len()
            );
            this.channel.stop(Error::ChannelStopped);
        });
    }
}
