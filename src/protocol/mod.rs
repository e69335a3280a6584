// Harbor Network Layer — Protocols
// Distributed under the MIT software license.

//! Message-pattern participants attached to a channel.
//!
//! A protocol registers keyed handlers on its channel's distributor and
//! lives exactly as long as those handlers: the registered closures hold
//! the only strong references, so clearing the distributor at channel
//! stop releases the protocol (no reference cycle survives a stop).
//!
//! The deep inheritance chain of classic stacks is flattened here:
//! [`ProtocolTimer`] is owned by the protocols that need a timer rather
//! than inherited, and ping v1/v2 are sibling structs.

pub mod address_in;
pub mod address_out;
pub mod ping;
pub mod reject;
pub mod version;

pub use address_in::{ProtocolAddressIn, ProtocolSeed};
pub use address_out::ProtocolAddressOut;
pub use ping::{attach_ping, ProtocolPingV1, ProtocolPingV2};
pub use reject::ProtocolReject;
pub use version::ProtocolVersion;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::net::channel::Channel;
use crate::runtime::deadline::Deadline;

/// A timed attachment: one re-armable deadline on the channel strand.
pub struct ProtocolTimer {
    deadline: Arc<Deadline>,
}

impl ProtocolTimer {
    pub fn new(channel: &Channel) -> Self {
        Self { deadline: Deadline::new(channel.strand().clone()) }
    }

    /// Re-arm; a pending handler is canceled first.
    pub fn reset(&self, duration: Duration, handler: impl FnOnce(Result<()>) + Send + 'static) {
        self.deadline.start(duration, handler);
    }

    pub fn stop(&self) {
        self.deadline.stop();
    }
}
