// Harbor Network Layer — Settings
// Distributed under the MIT software license.

//! Network configuration.
//!
//! Every tunable the core consumes lives here. Defaults describe a
//! mainnet-like node; tests shrink the durations. Durations are plain
//! seconds (`*_secs` accessors return [`Duration`]) so the struct stays
//! serde-friendly for host applications that load it from a file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::authority::Authority;

// =============================================================================
// PROTOCOL LEVELS
// =============================================================================

/// Oldest protocol level this node will talk to.
/// Predates bip31; the ping protocol degrades to the one-sided variant.
pub const LEVEL_MINIMUM: u32 = 31402;

/// bip31: ping carries a nonce and expects a matching pong.
pub const LEVEL_BIP31: u32 = 60001;

/// bip61: reject message.
pub const LEVEL_BIP61: u32 = 70002;

/// Newest protocol level this node speaks.
pub const LEVEL_MAXIMUM: u32 = 70016;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Worker threads backing the shared pool.
const DEFAULT_THREADS: u32 = 4;

/// Slot counts follow the classic 8 outbound / 117 inbound split.
const DEFAULT_INBOUND: u32 = 117;
const DEFAULT_OUTBOUND: u32 = 8;

/// Parallel dial attempts per outbound slot. First connect wins,
/// the rest are dropped.
const DEFAULT_CONNECT_BATCH: u32 = 5;

/// Seconds granted to a TCP dial before it is abandoned.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Seconds granted to the version/verack exchange.
/// Generous enough for high-latency links, short enough to shed
/// slowloris connections.
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// A channel with no inbound traffic for this long is dropped.
const DEFAULT_CHANNEL_INACTIVITY_SECS: u64 = 10 * 60;

/// Hard lifetime cap per channel; rotation keeps the peer set fresh.
const DEFAULT_CHANNEL_EXPIRATION_SECS: u64 = 90 * 60;

/// Lifetime cap for seed connections, which exist only to harvest
/// addresses and disconnect.
const DEFAULT_CHANNEL_GERMINATION_SECS: u64 = 30;

/// Seconds between keepalive rounds on an idle channel.
const DEFAULT_PING_INTERVAL_SECS: u64 = 60;

/// Seconds a bip31 peer gets to echo a ping nonce.
const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Address pool capacity. Oldest entries are evicted when full.
const DEFAULT_HOST_POOL_CAPACITY: u32 = 10_000;

/// Frame payloads above this limit stop the channel.
/// Matches the classic relay ceiling of ~4MB frames.
const DEFAULT_MAXIMUM_PAYLOAD: u32 = 4 * 1024 * 1024;

/// Network magic for the default (main) network.
const DEFAULT_NETWORK_MAGIC: u32 = 0xd9b4_bef9;

/// Settings consumed by the networking core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Worker count for the shared thread pool (>= 1).
    pub threads: u32,

    /// Inbound connection slots; zero disables the inbound session.
    pub inbound_connections: u32,
    /// Outbound connection slots; zero disables the outbound session.
    pub outbound_connections: u32,
    /// Parallel dial attempts per outbound slot.
    pub connect_batch_size: u32,

    /// Listeners for the inbound session.
    pub binds: Vec<Authority>,
    /// Seed endpoints used when the address pool is starved.
    pub seeds: Vec<Authority>,
    /// Pinned peers the manual session maintains forever.
    pub peers: Vec<Authority>,
    /// Authorities (optionally subnets) never connected to or stored.
    pub blocked: Vec<Authority>,
    /// Authorities we advertise as our own (dropped from gossip intake).
    pub selfs: Vec<Authority>,

    /// Durations, in seconds.
    pub connect_timeout: u64,
    pub handshake_timeout: u64,
    pub channel_inactivity: u64,
    pub channel_expiration: u64,
    pub channel_germination: u64,
    pub ping_interval: u64,
    pub response_timeout: u64,

    /// Address pool sizing and persistence.
    pub host_pool_capacity: u32,
    pub host_file_path: PathBuf,

    /// Handshake negotiation parameters.
    pub protocol_minimum: u32,
    pub protocol_maximum: u32,
    pub services_minimum: u64,
    pub services_maximum: u64,
    pub relay_transactions: bool,
    pub enable_address_v2: bool,
    pub enable_witness_tx: bool,

    /// Self-description sent in the version message.
    pub user_agent: String,
    pub start_height: u32,

    /// Wire framing.
    pub network_magic: u32,
    pub maximum_payload: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            inbound_connections: DEFAULT_INBOUND,
            outbound_connections: DEFAULT_OUTBOUND,
            connect_batch_size: DEFAULT_CONNECT_BATCH,
            binds: Vec::new(),
            seeds: Vec::new(),
            peers: Vec::new(),
            blocked: Vec::new(),
            selfs: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            channel_inactivity: DEFAULT_CHANNEL_INACTIVITY_SECS,
            channel_expiration: DEFAULT_CHANNEL_EXPIRATION_SECS,
            channel_germination: DEFAULT_CHANNEL_GERMINATION_SECS,
            ping_interval: DEFAULT_PING_INTERVAL_SECS,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT_SECS,
            host_pool_capacity: DEFAULT_HOST_POOL_CAPACITY,
            host_file_path: PathBuf::from("hosts.cache"),
            protocol_minimum: LEVEL_MINIMUM,
            protocol_maximum: LEVEL_MAXIMUM,
            services_minimum: crate::message::address::NODE_NETWORK,
            services_maximum: u64::MAX,
            relay_transactions: true,
            enable_address_v2: true,
            enable_witness_tx: true,
            user_agent: format!("/harbor:{}/", env!("CARGO_PKG_VERSION")),
            start_height: 0,
            network_magic: DEFAULT_NETWORK_MAGIC,
            maximum_payload: DEFAULT_MAXIMUM_PAYLOAD,
        }
    }
}

impl Settings {
    pub fn connect_timeout_secs(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn handshake_timeout_secs(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    pub fn channel_inactivity_secs(&self) -> Duration {
        Duration::from_secs(self.channel_inactivity)
    }

    pub fn channel_expiration_secs(&self) -> Duration {
        Duration::from_secs(self.channel_expiration)
    }

    pub fn channel_germination_secs(&self) -> Duration {
        Duration::from_secs(self.channel_germination)
    }

    pub fn ping_interval_secs(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn response_timeout_secs(&self) -> Duration {
        Duration::from_secs(self.response_timeout)
    }

    /// True when the authority is covered by the blocklist.
    pub fn is_blocked(&self, authority: &Authority) -> bool {
        self.blocked.iter().any(|entry| entry.matches(authority))
    }

    /// True when the authority advertises one of our own endpoints.
    pub fn is_self(&self, authority: &Authority) -> bool {
        self.selfs.iter().any(|entry| entry.matches(authority))
    }
}
