// Harbor Network Layer — Address Broadcast
// Distributed under the MIT software license.

//! The network-wide address relay bus.
//!
//! A retained broadcast on the network strand: senders include their
//! channel identifier, handlers filter out their own announcements. The
//! latest announcement replays to freshly attached channels so a new
//! peer hears the most recent discovery immediately.

use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::message::address::AddressItem;
use crate::runtime::strand::Strand;
use crate::runtime::subscriber::{Notification, Resubscriber};

/// An announced address and the channel identifier it arrived on.
pub type Announcement = (AddressItem, u64);

pub struct Broadcast {
    strand: Strand,
    subscriber: Arc<Mutex<Resubscriber<Announcement>>>,
}

impl Broadcast {
    pub fn new(strand: Strand) -> Arc<Self> {
        Arc::new(Self { strand, subscriber: Arc::new(Mutex::new(Resubscriber::new())) })
    }

    /// Announce a freshly accepted address.
    pub fn notify(&self, item: AddressItem, sender: u64) {
        let subscriber = Arc::clone(&self.subscriber);
        self.strand.dispatch(move || {
            subscriber.lock().unwrap().notify(&Ok(Arc::new((item, sender))));
        });
    }

    /// Attach a relay handler; the retained announcement replays first.
    pub fn subscribe(&self, handler: impl FnMut(&Notification<Announcement>) + Send + 'static) {
        let subscriber = Arc::clone(&self.subscriber);
        self.strand.dispatch(move || {
            subscriber.lock().unwrap().subscribe(handler);
        });
    }

    pub fn stop(&self, code: Error) {
        let subscriber = Arc::clone(&self.subscriber);
        self.strand.dispatch(move || {
            subscriber.lock().unwrap().stop(code);
        });
    }
}
