// Harbor Network Layer — Address Messages
// Distributed under the MIT software license.

//! Peer address records and the addr/getaddr exchange.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::codec::{Reader, Writer};
use super::identifier::Identifier;
use super::{Payload, MAX_ADDRESS};
use crate::config::authority::Authority;
use crate::error::{Error, Result};

// =============================================================================
// SERVICE FLAGS
// =============================================================================
// Advertised in the version message and in address gossip.

/// No services.
pub const NODE_NONE: u64 = 0;

/// NODE_NETWORK: serves the full historical chain.
pub const NODE_NETWORK: u64 = 1 << 0;

/// NODE_BLOOM: accepts bloom-filtered connections.
pub const NODE_BLOOM: u64 = 1 << 2;

/// NODE_WITNESS: relays witness data.
pub const NODE_WITNESS: u64 = 1 << 3;

/// NODE_CLIENT_FILTERS: serves compact client filters.
pub const NODE_CLIENT_FILTERS: u64 = 1 << 6;

/// NODE_NETWORK_LIMITED: serves only recent history.
pub const NODE_NETWORK_LIMITED: u64 = 1 << 10;

/// A gossiped peer record: authority plus last-seen time and services.
///
/// The timestamp is self-reported and untrusted; it feeds freshness
/// heuristics only. Service bits are a pure bitfield, compared bitwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressItem {
    /// Last-seen unix time, seconds.
    pub timestamp: u32,
    /// Advertised service bits.
    pub services: u64,
    /// Host as 16 IPv6 bytes (IPv4-mapped where applicable).
    pub ip: [u8; 16],
    /// TCP port.
    pub port: u16,
}

impl AddressItem {
    pub fn new(authority: Authority, timestamp: u32, services: u64) -> Self {
        Self { timestamp, services, ip: authority.ip_bytes(), port: authority.port() }
    }

    pub fn authority(&self) -> Authority {
        Authority::new(IpAddr::from(self.ip), self.port)
    }

    /// True when every required service bit is advertised.
    pub fn has_services(&self, required: u64) -> bool {
        self.services & required == required
    }

    /// Entry codec; version messages omit the timestamp field.
    pub fn read(reader: &mut Reader<'_>, with_timestamp: bool) -> Result<Self> {
        let timestamp = if with_timestamp { reader.read_u32_le()? } else { 0 };
        Ok(Self {
            timestamp,
            services: reader.read_u64_le()?,
            ip: reader.read_array()?,
            port: reader.read_u16_be()?,
        })
    }

    pub fn write(&self, writer: &mut Writer, with_timestamp: bool) {
        if with_timestamp {
            writer.write_u32_le(self.timestamp);
        }
        writer.write_u64_le(self.services);
        writer.write_bytes(&self.ip);
        writer.write_u16_be(self.port);
    }
}

/// The addr message: a batch of gossiped peer records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub addresses: Vec<AddressItem>,
}

impl Address {
    pub fn new(addresses: Vec<AddressItem>) -> Self {
        Self { addresses }
    }
}

impl Payload for Address {
    const IDENTIFIER: Identifier = Identifier::Address;

    fn read(reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        let count = reader.read_var_int()? as usize;
        if count > MAX_ADDRESS {
            return Err(Error::InvalidMessage);
        }

        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(AddressItem::read(reader, true)?);
        }

        Ok(Self { addresses })
    }

    fn write(&self, writer: &mut Writer, _version: u32) {
        writer.write_var_int(self.addresses.len() as u64);
        for address in &self.addresses {
            address.write(writer, true);
        }
    }
}

/// The getaddr message: a zero-body request for an addr sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetAddress;

impl Payload for GetAddress {
    const IDENTIFIER: Identifier = Identifier::GetAddress;

    fn read(_reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        Ok(Self)
    }

    fn write(&self, _writer: &mut Writer, _version: u32) {}
}
