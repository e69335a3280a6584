// Harbor Network Layer — Reject Logging
// Distributed under the MIT software license.

//! Steady-state reject handling (bip61): log with hash context, never
//! respond, never generate. Handshake-time rejects are the version
//! protocol's business.

use std::sync::Arc;

use crate::message::reject::Reject;
use crate::net::channel::Channel;

pub struct ProtocolReject {
    channel: Arc<Channel>,
}

impl ProtocolReject {
    pub fn start(channel: Arc<Channel>) {
        let protocol = Arc::new(Self { channel: Arc::clone(&channel) });
        channel.strand().dispatch(move || protocol.run());
    }

    fn run(self: Arc<Self>) {
        let received = Arc::clone(&self);
        self.channel.subscribe::<Reject>(self.channel.next_key(), move |notification| {
            match notification {
                Ok(message) => {
                    received.log(message);
                    true
                }
                Err(_) => false,
            }
        });
    }

    fn log(&self, message: &Reject) {
        match &message.hash {
            Some(hash) => tracing::warn!(
                "reject {} [{}] from {}: {:?} {} ({})",
                message.message,
                hex::encode(hash),
                self.channel.authority(),
                message.code,
                message.reason,
                self.channel.negotiation().user_agent
            ),
            None => tracing::warn!(
                "reject {} from {}: {:?} {}",
                message.message,
                self.channel.authority(),
                message.code,
                message.reason
            ),
        }
    }
}
