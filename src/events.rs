//! Numeric event tags fired at the host application.
//!
//! The core reports coarse lifecycle counts through a [`Reporter`]; the
//! host maps tags to whatever metrics pipeline it runs. Tags are a small
//! closed set with stable `u8` values.

use std::fmt;

/// Event tags passed to the reporter, with a `count` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// The network stopped; count is the number of channels dropped.
    Stop = 0,
    /// An outbound slot began taking an address.
    Outbound1 = 1,
    /// An outbound slot completed a dial batch.
    Outbound2 = 2,
    /// An outbound slot completed a handshake.
    Outbound3 = 3,
    /// An inbound channel was accepted.
    Inbound = 4,
    /// A seed connection finished harvesting.
    Seed = 5,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::Stop => "stop",
            Event::Outbound1 => "outbound1",
            Event::Outbound2 => "outbound2",
            Event::Outbound3 => "outbound3",
            Event::Inbound => "inbound",
            Event::Seed => "seed",
        };
        f.write_str(name)
    }
}

/// Sink for event counts. Implementations must be cheap and non-blocking;
/// firing happens on lifecycle strands.
pub trait Reporter: Send + Sync {
    fn fire(&self, event: Event, count: usize);
}

/// Default reporter: one debug line per event.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn fire(&self, event: Event, count: usize) {
        tracing::debug!("event {} ({})", event, count);
    }
}
