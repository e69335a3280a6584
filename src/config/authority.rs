// Harbor Network Layer — Peer Authority
// Distributed under the MIT software license.

//! Canonicalized network identity of a peer.
//!
//! An authority is a 16-byte IPv6 host (IPv4 embedded through the
//! well-known `::ffff:0:0/96` prefix), a TCP port, and an optional CIDR
//! width. The CIDR width turns an authority into a subnet pattern used by
//! blocklists; plain peer identities carry a width of zero.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::Error;

/// A canonicalized peer identity.
///
/// Equality (`==`) is structural: same host bytes, same port, same cidr.
/// Protocol-level matching (zero ports wild, subnet membership) goes
/// through [`Authority::matches`], which is deliberately not `Eq` — subnet
/// membership is not transitive, and containers key on identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Authority {
    /// Normalized host: IPv4 is stored as an IPv4-mapped IPv6 address.
    ip: Ipv6Addr,
    /// TCP port; zero acts as a wildcard in [`Authority::matches`].
    port: u16,
    /// Subnet width in bits over the *denormalized* host; zero = exact host.
    cidr: u8,
}

impl Authority {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip: normalize(ip), port, cidr: 0 }
    }

    pub fn with_cidr(ip: IpAddr, port: u16, cidr: u8) -> Self {
        Self { ip: normalize(ip), port, cidr }
    }

    /// Host as 16 normalized bytes (IPv4-mapped where applicable).
    pub fn ip_bytes(&self) -> [u8; 16] {
        self.ip.octets()
    }

    /// Denormalized host (IPv4 where the mapped prefix applies).
    pub fn ip(&self) -> IpAddr {
        denormalize(self.ip)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cidr(&self) -> u8 {
        self.cidr
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip(), self.port)
    }

    /// Protocol-level match: both non-zero ports must agree, and the other
    /// host must equal this host (cidr zero) or be a member of this subnet.
    pub fn matches(&self, other: &Authority) -> bool {
        if self.port != 0 && other.port != 0 && self.port != other.port {
            return false;
        }

        if self.cidr == 0 {
            return self.ip == other.ip;
        }

        is_member(other.ip(), self.ip, self.cidr)
    }

    /// True when a remote peer could plausibly dial this host; anything
    /// else has no business in the address pool. Embedded IPv4 hosts
    /// take the IPv4 arm by construction.
    pub fn is_routable(&self) -> bool {
        match self.ip() {
            IpAddr::V4(host) => {
                let unreachable = host.is_unspecified()
                    || host.is_loopback()
                    || host.is_private()
                    || host.is_link_local()
                    || host.is_documentation()
                    || host.is_broadcast();
                !unreachable
            }
            IpAddr::V6(host) => {
                !(host.is_unspecified() || host.is_loopback() || host.is_multicast())
                    && !in_reserved_v6(host)
            }
        }
    }
}

impl From<SocketAddr> for Authority {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Authority {
    /// `host:port` for IPv4, `[host]:port` for IPv6, optional `/cidr`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port)?,
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port)?,
        }

        if self.cidr != 0 {
            write!(f, "/{}", self.cidr)?;
        }

        Ok(())
    }
}

impl FromStr for Authority {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (endpoint, cidr) = match text.rsplit_once('/') {
            Some((endpoint, width)) => {
                let cidr: u8 = width.parse().map_err(|_| Error::AddressInvalid)?;
                (endpoint, cidr)
            }
            None => (text, 0),
        };

        let addr: SocketAddr = endpoint.parse().map_err(|_| Error::AddressInvalid)?;
        let max = match addr.ip() {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if cidr > max {
            return Err(Error::AddressInvalid);
        }

        Ok(Self::with_cidr(addr.ip(), addr.port(), cidr))
    }
}

/// Embed IPv4 hosts through the `::ffff:0:0/96` prefix.
fn normalize(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

/// Undo the IPv4 mapping where it applies.
fn denormalize(ip: Ipv6Addr) -> IpAddr {
    match ip.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(ip),
    }
}

/// IPv6 ranges that never gossip: unique-local, link-local, and the
/// documentation net, each as (network, prefix width).
const RESERVED_V6: [(u128, u32); 3] = [
    (0xfc00_u128 << 112, 7),
    (0xfe80_u128 << 112, 10),
    (0x2001_0db8_u128 << 96, 32),
];

fn in_reserved_v6(host: Ipv6Addr) -> bool {
    let bits = u128::from(host);
    RESERVED_V6
        .iter()
        .any(|&(network, width)| bits >> (128 - width) == network >> (128 - width))
}

/// Subnet membership of `host` in `subnet/cidr`.
///
/// The width counts bits of the denormalized host: 24 on an embedded IPv4
/// means the familiar /24, not 24 bits into the mapped prefix.
fn is_member(host: IpAddr, subnet: Ipv6Addr, cidr: u8) -> bool {
    match (host, denormalize(subnet)) {
        (IpAddr::V4(host), IpAddr::V4(net)) => {
            let width = u32::from(cidr.min(32));
            let mask = if width == 0 { 0 } else { u32::MAX << (32 - width) };
            (u32::from(host) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(host), IpAddr::V6(net)) => {
            let width = u32::from(cidr.min(128));
            let mask = if width == 0 { 0 } else { u128::MAX << (128 - width) };
            (u128::from(host) & mask) == (u128::from(net) & mask)
        }
        // Mixed families never match.
        _ => false,
    }
}
