//! Async substrate: thread pool, serialization strands, timers,
//! typed pub/sub, and completion races.

pub mod deadline;
pub mod races;
pub mod strand;
pub mod subscriber;

pub use deadline::Deadline;
pub use races::{RaceAll, RaceQuality, RaceSpeed, RaceUnity, RaceVolume};
pub use strand::{Strand, Threadpool};
pub use subscriber::{Desubscriber, Notification, Resubscriber, Subscriber, Unsubscriber};
