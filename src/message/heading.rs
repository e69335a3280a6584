// Harbor Network Layer — Frame Heading
// Distributed under the MIT software license.

//! The fixed 24-byte frame heading.
//!
//! Layout (little-endian):
//!
//! | Offset | Size | Field          |
//! |--------|------|----------------|
//! | 0      | 4    | magic          |
//! | 4      | 12   | command (NUL-padded ASCII) |
//! | 16     | 4    | payload length |
//! | 20     | 4    | checksum       |
//!
//! The checksum is the first four bytes of SHA256(SHA256(payload)),
//! carried verbatim (interpreted here as a little-endian u32 of those
//! bytes on both sides, so comparison is byte-exact).

use sha2::{Digest, Sha256};

use super::codec::{Reader, Writer};
use super::identifier::Identifier;
use crate::error::{Error, Result};

/// Heading size on the wire.
pub const HEADING_SIZE: usize = 24;

/// Command field width.
pub const COMMAND_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heading {
    pub magic: u32,
    pub command: [u8; COMMAND_SIZE],
    pub payload_size: u32,
    pub checksum: u32,
}

impl Heading {
    /// Build the heading for a serialized payload.
    pub fn for_payload(magic: u32, command: &str, payload: &[u8]) -> Self {
        let mut field = [0u8; COMMAND_SIZE];
        let bytes = command.as_bytes();
        let length = bytes.len().min(COMMAND_SIZE);
        field[..length].copy_from_slice(&bytes[..length]);

        Self {
            magic,
            command: field,
            payload_size: payload.len() as u32,
            checksum: checksum(payload),
        }
    }

    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            magic: reader.read_u32_le()?,
            command: reader.read_array()?,
            payload_size: reader.read_u32_le()?,
            checksum: reader.read_u32_le()?,
        })
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u32_le(self.magic);
        writer.write_bytes(&self.command);
        writer.write_u32_le(self.payload_size);
        writer.write_u32_le(self.checksum);
    }

    /// Command as text; fails on embedded non-ASCII or bytes after the
    /// NUL padding (a malformed frame, reported as `BadStream`).
    pub fn command_text(&self) -> Result<&str> {
        let end = self
            .command
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(COMMAND_SIZE);

        if self.command[end..].iter().any(|&byte| byte != 0) {
            return Err(Error::BadStream);
        }

        let text = std::str::from_utf8(&self.command[..end]).map_err(|_| Error::BadStream)?;
        if !text.is_ascii() {
            return Err(Error::BadStream);
        }

        Ok(text)
    }

    /// Identifier for the command; unknown commands yield
    /// [`Identifier::Unknown`], not an error.
    pub fn identifier(&self) -> Result<Identifier> {
        Ok(Identifier::from_command(self.command_text()?))
    }

    pub fn verify_checksum(&self, payload: &[u8]) -> bool {
        self.checksum == checksum(payload)
    }
}

/// First four bytes of the double-SHA256 of the payload.
pub fn checksum(payload: &[u8]) -> u32 {
    let inner = Sha256::digest(payload);
    let outer = Sha256::digest(inner);
    u32::from_le_bytes([outer[0], outer[1], outer[2], outer[3]])
}
