// Harbor Network Layer — Distributor
// Distributed under the MIT software license.

//! Routes raw wire frames to typed subscribers by message identifier.
//!
//! One keyed desubscriber per routed message type; protocols own the keys
//! and release them at stop. Identifiers with no subscriber entry are
//! consumed and dropped. Decoding happens only when someone listens, and
//! a decode failure is the caller's signal to stop the channel.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::address::{Address, GetAddress};
use crate::message::identifier::Identifier;
use crate::message::inventory::Inventory;
use crate::message::ping::{Ping, Pong};
use crate::message::reject::Reject;
use crate::message::version::{
    SendAddressV2, SendHeaders, Version, VersionAcknowledge, WitnessTxIdRelay,
};
use crate::message::{deserialize, Payload};
use crate::runtime::subscriber::{Desubscriber, Notification};

/// Key under which a protocol registers a handler.
pub type SubscriptionKey = u64;

/// A message type the distributor can route.
pub trait Routed: Payload {
    fn table(distributor: &mut Distributor) -> &mut Desubscriber<SubscriptionKey, Self>;
}

macro_rules! routed {
    ($message:ty, $field:ident) => {
        impl Routed for $message {
            fn table(distributor: &mut Distributor) -> &mut Desubscriber<SubscriptionKey, Self> {
                &mut distributor.$field
            }
        }
    };
}

routed!(Version, version);
routed!(VersionAcknowledge, version_acknowledge);
routed!(SendHeaders, send_headers);
routed!(SendAddressV2, send_address_v2);
routed!(WitnessTxIdRelay, witness_tx_id_relay);
routed!(Ping, ping);
routed!(Pong, pong);
routed!(GetAddress, get_address);
routed!(Address, address);
routed!(Inventory, inventory);
routed!(Reject, reject);

#[derive(Default)]
pub struct Distributor {
    version: Desubscriber<SubscriptionKey, Version>,
    version_acknowledge: Desubscriber<SubscriptionKey, VersionAcknowledge>,
    send_headers: Desubscriber<SubscriptionKey, SendHeaders>,
    send_address_v2: Desubscriber<SubscriptionKey, SendAddressV2>,
    witness_tx_id_relay: Desubscriber<SubscriptionKey, WitnessTxIdRelay>,
    ping: Desubscriber<SubscriptionKey, Ping>,
    pong: Desubscriber<SubscriptionKey, Pong>,
    get_address: Desubscriber<SubscriptionKey, GetAddress>,
    address: Desubscriber<SubscriptionKey, Address>,
    inventory: Desubscriber<SubscriptionKey, Inventory>,
    reject: Desubscriber<SubscriptionKey, Reject>,
}

impl Distributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keyed handler for message `M`. Strand-only.
    pub fn subscribe<M: Routed>(
        &mut self,
        key: SubscriptionKey,
        handler: impl FnMut(&Notification<M>) -> bool + Send + 'static,
    ) -> bool {
        M::table(self).subscribe(key, handler)
    }

    /// Release a keyed handler without notifying it. Strand-only.
    pub fn unsubscribe<M: Routed>(&mut self, key: SubscriptionKey) -> bool {
        M::table(self).unsubscribe(&key)
    }

    /// Decode and broadcast one received frame. Strand-only.
    ///
    /// Unrouted and unsubscribed identifiers are dropped; a decode error
    /// is returned so the channel stops with `InvalidMessage`.
    pub fn notify(&mut self, identifier: Identifier, body: &[u8], version: u32) -> Result<()> {
        match identifier {
            Identifier::Version => self.publish::<Version>(body, version),
            Identifier::VersionAcknowledge => self.publish::<VersionAcknowledge>(body, version),
            Identifier::SendHeaders => self.publish::<SendHeaders>(body, version),
            Identifier::SendAddressV2 => self.publish::<SendAddressV2>(body, version),
            Identifier::WitnessTxIdRelay => self.publish::<WitnessTxIdRelay>(body, version),
            Identifier::Ping => self.publish::<Ping>(body, version),
            Identifier::Pong => self.publish::<Pong>(body, version),
            Identifier::GetAddress => self.publish::<GetAddress>(body, version),
            Identifier::Address => self.publish::<Address>(body, version),
            Identifier::Inventory => self.publish::<Inventory>(body, version),
            Identifier::Reject => self.publish::<Reject>(body, version),
            // The remaining catalog belongs to the host application.
            _ => Ok(()),
        }
    }

    fn publish<M: Routed>(&mut self, body: &[u8], version: u32) -> Result<()> {
        let table = M::table(self);
        if table.len() == 0 {
            return Ok(());
        }

        let message = deserialize::<M>(body, version)?;
        table.notify(&Ok(Arc::new(message)));
        Ok(())
    }

    /// Terminal notification to every table; strictly last.
    pub fn stop(&mut self, code: Error) {
        self.version.stop(code);
        self.version_acknowledge.stop(code);
        self.send_headers.stop(code);
        self.send_address_v2.stop(code);
        self.witness_tx_id_relay.stop(code);
        self.ping.stop(code);
        self.pong.stop(code);
        self.get_address.stop(code);
        self.address.stop(code);
        self.inventory.stop(code);
        self.reject.stop(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LEVEL_MAXIMUM;
    use crate::message::inventory::{InventoryItem, INV_TRANSACTION};
    use crate::message::serialize;
    use std::sync::Mutex;

    fn inventory(fill: u8) -> Vec<u8> {
        let message = Inventory {
            items: vec![InventoryItem { kind: INV_TRANSACTION, hash: [fill; 32] }],
        };
        serialize(&message, LEVEL_MAXIMUM)
    }

    #[test]
    fn test_dispatch_order_across_messages() {
        // Handlers registered first are notified first for every message.
        let mut distributor = Distributor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["h1", "h2"] {
            let seen = Arc::clone(&seen);
            let key = if name == "h1" { 1 } else { 2 };
            distributor.subscribe::<Inventory>(key, move |notification| {
                let fill = notification.as_ref().unwrap().items[0].hash[0];
                seen.lock().unwrap().push(format!("{}(m{})", name, fill));
                true
            });
        }

        distributor
            .notify(Identifier::Inventory, &inventory(1), LEVEL_MAXIMUM)
            .unwrap();
        distributor
            .notify(Identifier::Inventory, &inventory(2), LEVEL_MAXIMUM)
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["h1(m1)", "h2(m1)", "h1(m2)", "h2(m2)"]
        );
    }

    #[test]
    fn test_unsubscribed_identifier_dropped() {
        let mut distributor = Distributor::new();
        // Garbage body: must not error because nobody listens.
        assert!(distributor
            .notify(Identifier::Ping, &[1, 2], LEVEL_MAXIMUM)
            .is_ok());
        // Unrouted identifiers are dropped too.
        assert!(distributor
            .notify(Identifier::Block, &[1, 2, 3], LEVEL_MAXIMUM)
            .is_ok());
    }

    #[test]
    fn test_decode_failure_reported() {
        let mut distributor = Distributor::new();
        distributor.subscribe::<Ping>(1, |_| true);

        let result = distributor.notify(Identifier::Ping, &[1, 2], LEVEL_MAXIMUM);
        assert_eq!(result, Err(Error::InvalidMessage));
    }

    #[test]
    fn test_stop_reaches_every_table() {
        let mut distributor = Distributor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let ping_seen = Arc::clone(&seen);
        distributor.subscribe::<Ping>(1, move |notification| {
            ping_seen.lock().unwrap().push(format!("ping {:?}", notification.as_ref().err()));
            true
        });
        let version_seen = Arc::clone(&seen);
        distributor.subscribe::<Version>(2, move |notification| {
            version_seen
                .lock()
                .unwrap()
                .push(format!("version {:?}", notification.as_ref().err()));
            true
        });

        distributor.stop(Error::ChannelStopped);
        let mut entries = seen.lock().unwrap().clone();
        entries.sort();
        assert_eq!(
            entries,
            vec!["ping Some(ChannelStopped)", "version Some(ChannelStopped)"]
        );
    }
}
