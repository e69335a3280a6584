// Harbor Network Layer — Seed Session
// Distributed under the MIT software license.

//! One-shot address harvesting.
//!
//! Dials every configured seed, runs the handshake, and lets the seed
//! protocol pull one addr payload into the pool before hanging up. The
//! germination deadline bounds each connection; a volume race reports
//! "enough" as soon as one seed delivers while the rest finish out.

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{wait_for_stop, Attachment, Session};
use crate::config::authority::Authority;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::net::connector::Connector;
use crate::net::network::NetworkContext;
use crate::runtime::races::RaceVolume;
use crate::runtime::strand::Strand;

pub struct SessionSeed {
    session: Arc<Session>,
}

impl SessionSeed {
    pub(crate) fn new(context: Arc<NetworkContext>) -> Self {
        Self { session: Session::new(context, "seed", Attachment::Seed) }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    /// Run the harvest to completion (all seeds finished or canceled).
    pub async fn start(&self) -> Result<()> {
        let context = self.session.context();
        let seeds = context.settings.seeds.clone();
        if seeds.is_empty() {
            tracing::info!("no seeds configured");
            return Ok(());
        }

        let race = Arc::new(Mutex::new(RaceVolume::new(
            seeds.len(),
            1,
            Error::AddressPoolEmpty,
        )));
        let (done, finished) = oneshot::channel();
        race.lock().unwrap().start(
            |result| {
                if result.is_ok() {
                    tracing::debug!("seeding sufficient");
                }
            },
            move |_| {
                let _ = done.send(());
            },
        );

        for seed in seeds {
            let session = Arc::clone(&self.session);
            let race = Arc::clone(&race);
            context.handle.spawn(async move {
                let result = harvest(&session, seed).await;
                if let Err(code) = &result {
                    tracing::debug!("seed {} failed: {}", seed, code);
                }
                race.lock().unwrap().finish(result);
            });
        }

        let _ = finished.await;

        let gathered = context.hosts.count().await;
        context.reporter.fire(Event::Seed, gathered);
        tracing::info!("seeding finished with {} hosts", gathered);
        Ok(())
    }
}

/// Dial one seed, handshake, and wait out the harvest.
async fn harvest(session: &Arc<Session>, seed: Authority) -> Result<()> {
    let context = session.context();

    let connector = Arc::new(Connector::new(
        Strand::new(&context.handle),
        context.settings.connect_timeout_secs(),
    ));
    session.track_connector(&connector);

    let socket = connector.connect(seed).await?;
    let lifetime = context.settings.channel_germination_secs();
    let channel = session.create_channel(socket, false, lifetime);

    session.start_channel(Arc::clone(&channel)).await?;
    wait_for_stop(&channel).await;
    Ok(())
}
