// Harbor Network Layer — Ping/Pong
// Distributed under the MIT software license.

//! Keepalive messages.
//!
//! Below bip31 a ping has an empty body and expects no reply; from bip31
//! it carries an eight-byte nonce echoed back in a pong.

use super::codec::{Reader, Writer};
use super::identifier::Identifier;
use super::Payload;
use crate::config::settings::LEVEL_BIP31;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping {
    pub nonce: u64,
}

impl Payload for Ping {
    const IDENTIFIER: Identifier = Identifier::Ping;

    fn read(reader: &mut Reader<'_>, version: u32) -> Result<Self> {
        if version < LEVEL_BIP31 {
            return Ok(Self { nonce: 0 });
        }

        Ok(Self { nonce: reader.read_u64_le()? })
    }

    fn write(&self, writer: &mut Writer, version: u32) {
        if version >= LEVEL_BIP31 {
            writer.write_u64_le(self.nonce);
        }
    }
}

/// Pong exists only from bip31; the nonce always travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pong {
    pub nonce: u64,
}

impl Payload for Pong {
    const IDENTIFIER: Identifier = Identifier::Pong;

    fn read(reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        Ok(Self { nonce: reader.read_u64_le()? })
    }

    fn write(&self, writer: &mut Writer, _version: u32) {
        writer.write_u64_le(self.nonce);
    }
}
