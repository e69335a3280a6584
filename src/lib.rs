//! Harbor: peer-to-peer networking for Nakamoto-style nodes.
//!
//! The crate establishes and services long-lived peer connections: it
//! frames and routes wire messages, negotiates the version handshake,
//! runs the steady-state channel protocols (keepalive, address gossip,
//! reject logging), and maintains a rotating pool of known peers.
//! Validation, storage, and the wider message catalog belong to the
//! host application.

pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod net;
pub mod protocol;
pub mod runtime;
pub mod session;

pub use config::{Authority, Settings};
pub use error::{Error, Result};
pub use events::{Event, Reporter, TracingReporter};
pub use message::{Address, AddressItem, GetAddress, Heading, Identifier, Ping, Pong, Version};
pub use net::{Channel, HostPool, Network};
pub use runtime::{Deadline, Strand, Threadpool};
