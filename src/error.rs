//! Closed error enumeration threaded through every asynchronous completion.
//!
//! Success is represented by `Ok(())`; the enum carries only failures.
//! Codes never propagate up through the public API — they are delivered
//! through subscriber stop notifications and the top-level stop completion.

use std::io;
use thiserror::Error;

/// Result alias used by every asynchronous completion in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a completion handler can observe.
///
/// Grouping mirrors the propagation policy:
/// - Cancellation codes terminate quietly (shutdown paths).
/// - Protocol codes stop the offending channel; the session loop continues.
/// - Handshake codes fail a single connection attempt.
/// - System codes surface resource problems to the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    // Cancellation
    #[error("channel stopped")]
    ChannelStopped,
    #[error("operation canceled")]
    OperationCanceled,
    #[error("operation timed out")]
    OperationTimeout,

    // Protocol
    #[error("invalid network magic")]
    InvalidMagic,
    #[error("oversized payload")]
    OversizedPayload,
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("invalid message")]
    InvalidMessage,
    #[error("unknown message")]
    UnknownMessage,
    #[error("bad stream")]
    BadStream,
    #[error("peer timed out")]
    PeerTimeout,
    #[error("protocol violation")]
    ProtocolViolation,

    // Handshake
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("insufficient peer version")]
    InsufficientPeerVersion,
    #[error("insufficient peer services")]
    InsufficientServices,
    #[error("connection to self")]
    SelfConnect,

    // Address pool
    #[error("address pool empty")]
    AddressPoolEmpty,
    #[error("invalid address")]
    AddressInvalid,
    #[error("address blocked")]
    AddressBlocked,

    // System
    #[error("resource exhausted")]
    ResourceExhausted,
    #[error("bind failed")]
    BindFailed,
    #[error("accept failed")]
    AcceptFailed,
    #[error("connect failed")]
    ConnectFailed,
}

impl Error {
    /// True for codes that represent orderly cancellation rather than fault.
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            Error::ChannelStopped | Error::OperationCanceled | Error::OperationTimeout
        )
    }

    /// Fold a socket-level I/O error into the closed set.
    pub fn from_io(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Error::OperationTimeout,
            io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => Error::BindFailed,
            io::ErrorKind::ConnectionRefused => Error::ConnectFailed,
            io::ErrorKind::OutOfMemory => Error::ResourceExhausted,
            _ => Error::BadStream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_grouping() {
        assert!(Error::ChannelStopped.is_canceled());
        assert!(Error::OperationCanceled.is_canceled());
        assert!(!Error::InvalidChecksum.is_canceled());
        assert!(!Error::SelfConnect.is_canceled());
    }

    #[test]
    fn test_io_fold() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(Error::from_io(&refused), Error::ConnectFailed);

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(Error::from_io(&timed_out), Error::OperationTimeout);
    }
}
