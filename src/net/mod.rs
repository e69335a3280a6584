//! The connection engine: sockets, framing, dispatch, channels, and the
//! network root.

pub mod acceptor;
pub mod broadcast;
pub mod channel;
pub mod connector;
pub mod distributor;
pub mod hosts;
pub mod network;
pub mod proxy;
pub mod rate_limit;
pub mod socket;

pub use acceptor::Acceptor;
pub use broadcast::Broadcast;
pub use channel::{Channel, Negotiation};
pub use connector::Connector;
pub use distributor::{Distributor, Routed, SubscriptionKey};
pub use hosts::{HostPool, Hosts};
pub use network::{Network, NetworkContext};
pub use proxy::Proxy;
pub use rate_limit::TokenBucket;
pub use socket::Socket;
