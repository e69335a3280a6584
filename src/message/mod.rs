// Harbor Network Layer — Messages
// Distributed under the MIT software license.

//! Wire messages: framing, identifiers, and payload codecs.
//!
//! The codec contract is [`Payload`]: one identifier, one read routine,
//! one write routine, both parameterized by the negotiated protocol
//! level (older levels omit trailing fields). Only the messages the core
//! itself exchanges are implemented; the wider catalog (blocks,
//! transactions, filters) belongs to the host application.

pub mod address;
pub mod codec;
pub mod heading;
pub mod identifier;
pub mod inventory;
pub mod ping;
pub mod reject;
pub mod version;

pub use address::{Address, AddressItem, GetAddress};
pub use heading::{Heading, COMMAND_SIZE, HEADING_SIZE};
pub use identifier::Identifier;
pub use inventory::{Inventory, InventoryItem};
pub use ping::{Ping, Pong};
pub use reject::{Reject, RejectCode};
pub use version::{SendAddressV2, SendHeaders, Version, VersionAcknowledge, WitnessTxIdRelay};

use codec::{Reader, Writer};
use crate::error::{Error, Result};

// =============================================================================
// PROTOCOL LIMITS
// =============================================================================

/// Maximum entries in a single addr message.
pub const MAX_ADDRESS: usize = 1_000;

/// Maximum entries in a single inv message.
pub const MAX_INVENTORY: usize = 50_000;

/// Maximum reject message payload; a guess, required as a memory guard.
pub const MAX_REJECT_PAYLOAD: usize = u16::MAX as usize;

/// Address announcements relayed per broadcast; an address pool guard.
pub const MAX_ADVERTISEMENT: usize = 10;

/// Codec contract for one wire message.
pub trait Payload: Send + Sync + Sized + 'static {
    const IDENTIFIER: Identifier;

    fn read(reader: &mut Reader<'_>, version: u32) -> Result<Self>;
    fn write(&self, writer: &mut Writer, version: u32);
}

/// Serialize a payload body (no heading).
pub fn serialize<M: Payload>(message: &M, version: u32) -> Vec<u8> {
    let mut writer = Writer::new();
    message.write(&mut writer, version);
    writer.into_bytes()
}

/// Deserialize a payload body, rejecting trailing garbage.
pub fn deserialize<M: Payload>(body: &[u8], version: u32) -> Result<M> {
    let mut reader = Reader::new(body);
    let message = M::read(&mut reader, version)?;
    if !reader.is_exhausted() {
        return Err(Error::InvalidMessage);
    }

    Ok(message)
}

/// Per-identifier payload ceiling, tighter than the configured global
/// maximum for the messages the core understands.
pub fn maximum_payload_for(identifier: Identifier, maximum: usize) -> usize {
    match identifier {
        // Zero-body messages.
        Identifier::VersionAcknowledge
        | Identifier::GetAddress
        | Identifier::SendHeaders
        | Identifier::SendAddressV2
        | Identifier::WitnessTxIdRelay
        | Identifier::MemoryPool => 0,
        Identifier::Ping | Identifier::Pong => 8,
        Identifier::Version => 1024,
        // 9-byte count prefix plus fixed-size entries.
        Identifier::Address => 9 + MAX_ADDRESS * 30,
        Identifier::Inventory | Identifier::GetData | Identifier::NotFound => {
            9 + MAX_INVENTORY * 36
        }
        Identifier::Reject => MAX_REJECT_PAYLOAD,
        _ => maximum,
    }
}
