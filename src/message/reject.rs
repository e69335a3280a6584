// Harbor Network Layer — Reject
// Distributed under the MIT software license.

//! The reject message (bip61). Advisory only: attackers ignore it, so the
//! core logs rejects and never acts on their content in steady state.

use super::codec::{Reader, Writer};
use super::identifier::Identifier;
use super::Payload;
use crate::error::{Error, Result};

/// Reject reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectCode {
    /// Message could not be decoded.
    Malformed = 0x01,
    /// Data failed validation.
    Invalid = 0x10,
    /// Uses an obsolete protocol feature.
    Obsolete = 0x11,
    /// Already have this data.
    Duplicate = 0x12,
    /// Violates policy, not consensus.
    NonStandard = 0x40,
    /// Output below the dust threshold.
    Dust = 0x41,
    /// Transaction fee too low.
    InsufficientFee = 0x42,
    /// Conflicts with a checkpoint.
    Checkpoint = 0x43,
}

impl RejectCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(RejectCode::Malformed),
            0x10 => Some(RejectCode::Invalid),
            0x11 => Some(RejectCode::Obsolete),
            0x12 => Some(RejectCode::Duplicate),
            0x40 => Some(RejectCode::NonStandard),
            0x41 => Some(RejectCode::Dust),
            0x42 => Some(RejectCode::InsufficientFee),
            0x43 => Some(RejectCode::Checkpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    /// Command of the rejected message.
    pub message: String,
    pub code: RejectCode,
    pub reason: String,
    /// Hash context when the rejected message names an object (tx/block).
    pub hash: Option<[u8; 32]>,
}

impl Reject {
    /// True when this reject names our version message — a terminal
    /// handshake failure rather than steady-state advice.
    pub fn is_version_reject(&self) -> bool {
        self.message == Identifier::Version.command()
    }
}

impl Payload for Reject {
    const IDENTIFIER: Identifier = Identifier::Reject;

    fn read(reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        let message = reader.read_var_string()?;
        let code = RejectCode::from_byte(reader.read_u8()?).ok_or(Error::InvalidMessage)?;
        let reason = reader.read_var_string()?;

        let hash = if reader.remaining() >= 32 {
            Some(reader.read_array()?)
        } else {
            None
        };

        Ok(Self { message, code, reason, hash })
    }

    fn write(&self, writer: &mut Writer, _version: u32) {
        writer.write_var_string(&self.message);
        writer.write_u8(self.code as u8);
        writer.write_var_string(&self.reason);
        if let Some(hash) = &self.hash {
            writer.write_bytes(hash);
        }
    }
}
