// Harbor Network Layer — Outbound Session
// Distributed under the MIT software license.

//! The outreach loop: a fixed number of slots, each holding one live
//! outbound channel at a time.
//!
//! Per slot: reserve addresses, race a dial batch (first connect wins,
//! losers are released), handshake, attach, then hold until the channel
//! stops. Failures taint the reservation and the loop continues; a dry
//! pool backs the slot off rather than spinning.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use super::{wait_for_stop, Attachment, Session};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::message::address::AddressItem;
use crate::net::channel::Channel;
use crate::net::connector::Connector;
use crate::net::network::NetworkContext;
use crate::net::socket::Socket;
use crate::runtime::races::RaceSpeed;
use crate::runtime::strand::Strand;

/// Backoff when the address pool has nothing to offer.
const POOL_DRY_DELAY_SECS: u64 = 10;

/// Pause between failed cycles so a dead network does not spin a slot.
const CYCLE_DELAY_SECS: u64 = 1;

pub struct SessionOutbound {
    session: Arc<Session>,
}

impl SessionOutbound {
    pub(crate) fn new(context: Arc<NetworkContext>) -> Self {
        Self { session: Session::new(context, "outbound", Attachment::Full) }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    /// Launch one task per outbound slot.
    pub async fn start(&self) -> Result<()> {
        let slots = self.session.context().settings.outbound_connections;
        if slots == 0 {
            tracing::info!("outbound session disabled");
            return Ok(());
        }

        for slot in 0..slots {
            let session = Arc::clone(&self.session);
            self.session
                .context()
                .handle
                .spawn(async move { slot_loop(session, slot).await });
        }

        Ok(())
    }
}

async fn slot_loop(session: Arc<Session>, slot: u32) {
    while !session.is_stopped() {
        session.context().reporter.fire(Event::Outbound1, slot as usize);

        match next_channel(&session).await {
            Ok(channel) => {
                session.context().reporter.fire(Event::Outbound3, slot as usize);
                wait_for_stop(&channel).await;
            }
            Err(Error::AddressPoolEmpty) => {
                if session
                    .sleep_or_stopped(Duration::from_secs(POOL_DRY_DELAY_SECS))
                    .await
                {
                    break;
                }
            }
            Err(code) => {
                if code.is_canceled() {
                    break;
                }
                if session
                    .sleep_or_stopped(Duration::from_secs(CYCLE_DELAY_SECS))
                    .await
                {
                    break;
                }
            }
        }
    }

    tracing::debug!("outbound slot {} retired", slot);
}

/// One full cycle: reserve, dial, handshake.
async fn next_channel(session: &Arc<Session>) -> Result<Arc<Channel>> {
    let batch = take_batch(session).await?;
    session.context().reporter.fire(Event::Outbound2, batch.len());

    let (socket, item) = dial_batch(session, batch).await?;

    let lifetime = session.context().settings.channel_expiration_secs();
    let channel = session.create_channel(socket, false, lifetime);

    match session.start_channel(Arc::clone(&channel)).await {
        Ok(()) => {
            // The dial succeeded and the peer speaks; keep the entry hot.
            session.context().hosts.restore(item).await;
            Ok(channel)
        }
        Err(code) => {
            session.context().hosts.taint(item.authority()).await;
            Err(code)
        }
    }
}

/// Reserve up to a batch of unblocked addresses.
async fn take_batch(session: &Arc<Session>) -> Result<Vec<AddressItem>> {
    let context = session.context();
    let batch_size = context.settings.connect_batch_size.max(1);

    let mut items = Vec::with_capacity(batch_size as usize);
    while items.len() < batch_size as usize {
        match context.hosts.take().await {
            Ok(item) => {
                let authority = item.authority();
                if context.settings.is_blocked(&authority) {
                    context.hosts.taint(authority).await;
                    continue;
                }
                items.push(item);
            }
            Err(_) => break,
        }
    }

    if items.is_empty() {
        return Err(Error::AddressPoolEmpty);
    }

    Ok(items)
}

/// Dial every reserved address in parallel; the first connect wins.
/// Losing connections are closed and their reservations restored,
/// failed dials are tainted.
async fn dial_batch(
    session: &Arc<Session>,
    batch: Vec<AddressItem>,
) -> Result<(Socket, AddressItem)> {
    let context = session.context();
    let size = batch.len();

    let race = Arc::new(Mutex::new(RaceSpeed::<()>::new(size, 1)));
    let connected: Arc<Mutex<Vec<(Socket, AddressItem)>>> = Arc::new(Mutex::new(Vec::new()));
    let (done, finished) = oneshot::channel();
    race.lock().unwrap().start(|_| {}, move |aggregate| {
        let _ = done.send(aggregate);
    });

    for item in batch {
        let authority = item.authority();
        let connector = Arc::new(Connector::new(
            Strand::new(&context.handle),
            context.settings.connect_timeout_secs(),
        ));
        session.track_connector(&connector);

        let race = Arc::clone(&race);
        let connected = Arc::clone(&connected);
        let hosts = Arc::clone(&context.hosts);
        context.handle.spawn(async move {
            match connector.connect(authority).await {
                Ok(socket) => {
                    connected.lock().unwrap().push((socket, item));
                    race.lock().unwrap().finish(Ok(Arc::new(())));
                }
                Err(code) => {
                    hosts.taint(authority).await;
                    race.lock().unwrap().finish(Err(code));
                }
            }
        });
    }

    let aggregate = finished.await.map_err(|_| Error::OperationCanceled)?;

    let entries: Vec<(Socket, AddressItem)> = {
        let mut connected = connected.lock().unwrap();
        connected.drain(..).collect()
    };

    let mut winner = None;
    for (socket, item) in entries {
        if winner.is_none() {
            winner = Some((socket, item));
        } else {
            // A slower success: close it and release the reservation.
            socket.stop();
            context.hosts.restore(item).await;
        }
    }

    match winner {
        Some(pair) => Ok(pair),
        None => Err(aggregate.err().unwrap_or(Error::ConnectFailed)),
    }
}
