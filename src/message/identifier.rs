// Harbor Network Layer — Message Identifiers
// Distributed under the MIT software license.

//! The closed identifier set and its mapping to wire commands.
//!
//! Every heading command maps to exactly one identifier; commands outside
//! the set map to [`Identifier::Unknown`] and are consumed without
//! dispatch. The set is closed: adding a message means extending this
//! enum, its two mapping tables, and the distributor.

use std::fmt;

/// Message identifiers, one per protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Unknown,
    Address,
    Alert,
    Block,
    BloomFilterAdd,
    BloomFilterClear,
    BloomFilterLoad,
    ClientFilter,
    ClientFilterCheckpoint,
    ClientFilterHeaders,
    CompactBlock,
    CompactTransactions,
    FeeFilter,
    GetAddress,
    GetBlocks,
    GetClientFilterCheckpoint,
    GetClientFilterHeaders,
    GetClientFilters,
    GetCompactTransactions,
    GetData,
    GetHeaders,
    Headers,
    Inventory,
    MemoryPool,
    MerkleBlock,
    NotFound,
    Ping,
    Pong,
    Reject,
    SendAddressV2,
    SendCompact,
    SendHeaders,
    Transaction,
    Version,
    VersionAcknowledge,
    WitnessTxIdRelay,
}

impl Identifier {
    /// The ASCII command carried in the heading, empty for `Unknown`.
    pub fn command(&self) -> &'static str {
        match self {
            Identifier::Unknown => "",
            Identifier::Address => "addr",
            Identifier::Alert => "alert",
            Identifier::Block => "block",
            Identifier::BloomFilterAdd => "filteradd",
            Identifier::BloomFilterClear => "filterclear",
            Identifier::BloomFilterLoad => "filterload",
            Identifier::ClientFilter => "cfilter",
            Identifier::ClientFilterCheckpoint => "cfcheckpt",
            Identifier::ClientFilterHeaders => "cfheaders",
            Identifier::CompactBlock => "cmpctblock",
            Identifier::CompactTransactions => "blocktxn",
            Identifier::FeeFilter => "feefilter",
            Identifier::GetAddress => "getaddr",
            Identifier::GetBlocks => "getblocks",
            Identifier::GetClientFilterCheckpoint => "getcfcheckpt",
            Identifier::GetClientFilterHeaders => "getcfheaders",
            Identifier::GetClientFilters => "getcfilters",
            Identifier::GetCompactTransactions => "getblocktxn",
            Identifier::GetData => "getdata",
            Identifier::GetHeaders => "getheaders",
            Identifier::Headers => "headers",
            Identifier::Inventory => "inv",
            Identifier::MemoryPool => "mempool",
            Identifier::MerkleBlock => "merkleblock",
            Identifier::NotFound => "notfound",
            Identifier::Ping => "ping",
            Identifier::Pong => "pong",
            Identifier::Reject => "reject",
            Identifier::SendAddressV2 => "sendaddrv2",
            Identifier::SendCompact => "sendcmpct",
            Identifier::SendHeaders => "sendheaders",
            Identifier::Transaction => "tx",
            Identifier::Version => "version",
            Identifier::VersionAcknowledge => "verack",
            Identifier::WitnessTxIdRelay => "wtxidrelay",
        }
    }

    /// Map a heading command; anything unrecognized is `Unknown`.
    pub fn from_command(command: &str) -> Identifier {
        match command {
            "addr" => Identifier::Address,
            "alert" => Identifier::Alert,
            "block" => Identifier::Block,
            "filteradd" => Identifier::BloomFilterAdd,
            "filterclear" => Identifier::BloomFilterClear,
            "filterload" => Identifier::BloomFilterLoad,
            "cfilter" => Identifier::ClientFilter,
            "cfcheckpt" => Identifier::ClientFilterCheckpoint,
            "cfheaders" => Identifier::ClientFilterHeaders,
            "cmpctblock" => Identifier::CompactBlock,
            "blocktxn" => Identifier::CompactTransactions,
            "feefilter" => Identifier::FeeFilter,
            "getaddr" => Identifier::GetAddress,
            "getblocks" => Identifier::GetBlocks,
            "getcfcheckpt" => Identifier::GetClientFilterCheckpoint,
            "getcfheaders" => Identifier::GetClientFilterHeaders,
            "getcfilters" => Identifier::GetClientFilters,
            "getblocktxn" => Identifier::GetCompactTransactions,
            "getdata" => Identifier::GetData,
            "getheaders" => Identifier::GetHeaders,
            "headers" => Identifier::Headers,
            "inv" => Identifier::Inventory,
            "mempool" => Identifier::MemoryPool,
            "merkleblock" => Identifier::MerkleBlock,
            "notfound" => Identifier::NotFound,
            "ping" => Identifier::Ping,
            "pong" => Identifier::Pong,
            "reject" => Identifier::Reject,
            "sendaddrv2" => Identifier::SendAddressV2,
            "sendcmpct" => Identifier::SendCompact,
            "sendheaders" => Identifier::SendHeaders,
            "tx" => Identifier::Transaction,
            "version" => Identifier::Version,
            "verack" => Identifier::VersionAcknowledge,
            "wtxidrelay" => Identifier::WitnessTxIdRelay,
            _ => Identifier::Unknown,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Identifier::Unknown {
            f.write_str("unknown")
        } else {
            f.write_str(self.command())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[Identifier] = &[
        Identifier::Address,
        Identifier::Alert,
        Identifier::Block,
        Identifier::BloomFilterAdd,
        Identifier::BloomFilterClear,
        Identifier::BloomFilterLoad,
        Identifier::ClientFilter,
        Identifier::ClientFilterCheckpoint,
        Identifier::ClientFilterHeaders,
        Identifier::CompactBlock,
        Identifier::CompactTransactions,
        Identifier::FeeFilter,
        Identifier::GetAddress,
        Identifier::GetBlocks,
        Identifier::GetClientFilterCheckpoint,
        Identifier::GetClientFilterHeaders,
        Identifier::GetClientFilters,
        Identifier::GetCompactTransactions,
        Identifier::GetData,
        Identifier::GetHeaders,
        Identifier::Headers,
        Identifier::Inventory,
        Identifier::MemoryPool,
        Identifier::MerkleBlock,
        Identifier::NotFound,
        Identifier::Ping,
        Identifier::Pong,
        Identifier::Reject,
        Identifier::SendAddressV2,
        Identifier::SendCompact,
        Identifier::SendHeaders,
        Identifier::Transaction,
        Identifier::Version,
        Identifier::VersionAcknowledge,
        Identifier::WitnessTxIdRelay,
    ];

    #[test]
    fn test_command_mapping_round_trips() {
        for identifier in ALL {
            let command = identifier.command();
            assert!(!command.is_empty());
            assert!(command.len() <= 12, "{} exceeds heading field", command);
            assert_eq!(Identifier::from_command(command), *identifier);
        }
    }

    #[test]
    fn test_unrecognized_commands_map_to_unknown() {
        assert_eq!(Identifier::from_command("frobnicate"), Identifier::Unknown);
        assert_eq!(Identifier::from_command(""), Identifier::Unknown);
    }
}
