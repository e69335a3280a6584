// Harbor Network Layer — Address Serving
// Distributed under the MIT software license.

//! Outbound address gossip: answer one getaddr per channel and relay
//! network-bus announcements to everyone but their source, under a
//! small quota.

use std::sync::{Arc, Mutex};

use crate::message::address::{Address, AddressItem, GetAddress};
use crate::message::{MAX_ADDRESS, MAX_ADVERTISEMENT};
use crate::net::broadcast::Broadcast;
use crate::net::channel::Channel;
use crate::net::hosts::HostPool;
use crate::net::rate_limit::TokenBucket;

/// Relay accrual once the burst quota is spent.
const RELAY_PER_MINUTE: u32 = 6;

pub struct ProtocolAddressOut {
    channel: Arc<Channel>,
    hosts: Arc<HostPool>,
    broadcast: Arc<Broadcast>,
    /// Relay quota: small burst, slow refill.
    quota: Mutex<TokenBucket>,
}

impl ProtocolAddressOut {
    pub fn start(channel: Arc<Channel>, hosts: Arc<HostPool>, broadcast: Arc<Broadcast>) {
        let protocol = Arc::new(Self {
            channel: Arc::clone(&channel),
            hosts,
            broadcast,
            quota: Mutex::new(TokenBucket::new(MAX_ADVERTISEMENT as u32, RELAY_PER_MINUTE)),
        });

        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        let requested = Arc::clone(&self);
        self.channel.subscribe::<GetAddress>(self.channel.next_key(), move |notification| {
            if notification.is_ok() {
                requested.answer();
            }
            // One reply per channel; repeated getaddr is noise.
            false
        });

        // The bus outlives channels, so the relay handler holds a weak
        // reference and goes quiet once the channel is gone.
        let relay = Arc::downgrade(&self);
        self.broadcast.subscribe(move |notification| {
            if let (Ok(announcement), Some(protocol)) = (notification, relay.upgrade()) {
                protocol.relay(announcement.0, announcement.1);
            }
        });
    }

    fn answer(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.channel.strand().handle().spawn(async move {
            let sample = this.hosts.sample(MAX_ADDRESS).await;
            if sample.is_empty() {
                return;
            }

            tracing::debug!(
                "serving {} addresses to {}",
                sample.len(),
                this.channel.authority()
            );
            this.channel.send(&Address::new(sample), |_| {});
        });
    }

    fn relay(&self, item: AddressItem, sender: u64) {
        if sender == self.channel.identifier() || self.channel.is_stopped() {
            return;
        }

        if !self.quota.lock().unwrap().take(1) {
            return;
        }

        self.channel.send(&Address::new(vec![item]), |_| {});
    }
}
