// Harbor Network Layer — Handshake Messages
// Distributed under the MIT software license.

//! The version message and the small zero-body messages negotiated
//! alongside it.

use super::address::AddressItem;
use super::codec::{Reader, Writer};
use super::identifier::Identifier;
use super::Payload;
use crate::error::Result;

/// Protocol level from which the trailing relay flag exists (bip37).
const LEVEL_BIP37: u32 = 70001;

/// The version message: the opening declaration of a handshake.
///
/// `nonce` is random per channel and detects connections looped back to
/// ourselves. `address_receiver` reflects how we see the peer, which the
/// peer may use for external-address discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Sender's highest protocol level.
    pub value: u32,
    /// Sender's advertised service bits.
    pub services: u64,
    /// Sender's unix time, seconds (self-reported, untrusted).
    pub timestamp: u64,
    /// The receiving peer's address as the sender sees it.
    pub address_receiver: AddressItem,
    /// The sender's own address (commonly unroutable zeros).
    pub address_sender: AddressItem,
    /// Random per-connection nonce for self-connect detection.
    pub nonce: u64,
    /// Client software identifier.
    pub user_agent: String,
    /// Sender's best chain height.
    pub start_height: u32,
    /// Whether the sender wants transaction relay (bip37; absent = true).
    pub relay: bool,
}

impl Payload for Version {
    const IDENTIFIER: Identifier = Identifier::Version;

    fn read(reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        let value = reader.read_u32_le()?;
        let services = reader.read_u64_le()?;
        let timestamp = reader.read_u64_le()?;
        let address_receiver = AddressItem::read(reader, false)?;
        let address_sender = AddressItem::read(reader, false)?;
        let nonce = reader.read_u64_le()?;
        let user_agent = reader.read_var_string()?;
        let start_height = reader.read_u32_le()?;

        // The declared level governs the trailing flag, not the channel's
        // negotiated level (which does not exist yet).
        let relay = if value >= LEVEL_BIP37 && !reader.is_exhausted() {
            reader.read_u8()? != 0
        } else {
            true
        };

        Ok(Self {
            value,
            services,
            timestamp,
            address_receiver,
            address_sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }

    fn write(&self, writer: &mut Writer, _version: u32) {
        writer.write_u32_le(self.value);
        writer.write_u64_le(self.services);
        writer.write_u64_le(self.timestamp);
        self.address_receiver.write(writer, false);
        self.address_sender.write(writer, false);
        writer.write_u64_le(self.nonce);
        writer.write_var_string(&self.user_agent);
        writer.write_u32_le(self.start_height);
        if self.value >= LEVEL_BIP37 {
            writer.write_u8(u8::from(self.relay));
        }
    }
}

/// verack: confirms receipt of the peer's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionAcknowledge;

impl Payload for VersionAcknowledge {
    const IDENTIFIER: Identifier = Identifier::VersionAcknowledge;

    fn read(_reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        Ok(Self)
    }

    fn write(&self, _writer: &mut Writer, _version: u32) {}
}

/// sendheaders: sticky preference for header announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendHeaders;

impl Payload for SendHeaders {
    const IDENTIFIER: Identifier = Identifier::SendHeaders;

    fn read(_reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        Ok(Self)
    }

    fn write(&self, _writer: &mut Writer, _version: u32) {}
}

/// sendaddrv2: sticky v2-address capability (bip155).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendAddressV2;

impl Payload for SendAddressV2 {
    const IDENTIFIER: Identifier = Identifier::SendAddressV2;

    fn read(_reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        Ok(Self)
    }

    fn write(&self, _writer: &mut Writer, _version: u32) {}
}

/// wtxidrelay: witness-txid relay capability (bip339); valid only
/// between version and verack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WitnessTxIdRelay;

impl Payload for WitnessTxIdRelay {
    const IDENTIFIER: Identifier = Identifier::WitnessTxIdRelay;

    fn read(_reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        Ok(Self)
    }

    fn write(&self, _writer: &mut Writer, _version: u32) {}
}
