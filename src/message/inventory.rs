// Harbor Network Layer — Inventory
// Distributed under the MIT software license.

//! Inventory announcements. The core routes these; acting on them is the
//! host application's business.

use super::codec::{Reader, Writer};
use super::identifier::Identifier;
use super::{Payload, MAX_INVENTORY};
use crate::error::{Error, Result};

// Inventory type ids on the wire.
pub const INV_TRANSACTION: u32 = 1;
pub const INV_BLOCK: u32 = 2;
pub const INV_FILTERED_BLOCK: u32 = 3;
pub const INV_COMPACT_BLOCK: u32 = 4;
pub const INV_WITNESS_FLAG: u32 = 1 << 30;

/// One announced object: a type id and a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InventoryItem {
    pub kind: u32,
    pub hash: [u8; 32],
}

impl InventoryItem {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { kind: reader.read_u32_le()?, hash: reader.read_array()? })
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u32_le(self.kind);
        writer.write_bytes(&self.hash);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inventory {
    pub items: Vec<InventoryItem>,
}

impl Payload for Inventory {
    const IDENTIFIER: Identifier = Identifier::Inventory;

    fn read(reader: &mut Reader<'_>, _version: u32) -> Result<Self> {
        let count = reader.read_var_int()? as usize;
        if count > MAX_INVENTORY {
            return Err(Error::InvalidMessage);
        }

        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(InventoryItem::read(reader)?);
        }

        Ok(Self { items })
    }

    fn write(&self, writer: &mut Writer, _version: u32) {
        writer.write_var_int(self.items.len() as u64);
        for item in &self.items {
            item.write(writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LEVEL_MAXIMUM;
    use crate::message::{deserialize, serialize};

    #[test]
    fn test_inventory_round_trip() {
        let message = Inventory {
            items: vec![
                InventoryItem { kind: INV_TRANSACTION, hash: [1; 32] },
                InventoryItem { kind: INV_BLOCK | INV_WITNESS_FLAG, hash: [2; 32] },
            ],
        };

        let body = serialize(&message, LEVEL_MAXIMUM);
        assert_eq!(body.len(), 1 + 2 * 36);
        assert_eq!(deserialize::<Inventory>(&body, LEVEL_MAXIMUM).unwrap(), message);
    }

    #[test]
    fn test_truncated_entry_fails() {
        let mut writer = Writer::new();
        writer.write_var_int(1);
        writer.write_u32_le(INV_BLOCK);
        // hash missing
        let body = writer.into_bytes();
        assert_eq!(deserialize::<Inventory>(&body, LEVEL_MAXIMUM), Err(Error::InvalidMessage));
    }
}
