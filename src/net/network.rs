// Harbor Network Layer — Network Root
// Distributed under the MIT software license.

//! The root object: thread pool, address pool, relay bus, sessions.
//!
//! Start order: load hosts, seed when the pool is starving, then the
//! inbound, outbound, and manual sessions. Stop cascades through every
//! session to every channel, persists the pool, and fires the stop
//! event through a latch that survives early returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

use super::broadcast::Broadcast;
use super::hosts::HostPool;
use crate::config::authority::Authority;
use crate::config::settings::Settings;
use crate::error::{Error, Result};
use crate::events::{Event, Reporter, TracingReporter};
use crate::runtime::races::{RaceAll, RaceUnity};
use crate::runtime::strand::{Strand, Threadpool};
use crate::session::{SessionInbound, SessionManual, SessionOutbound, SessionSeed};

/// Shared services every session and protocol reaches through.
pub struct NetworkContext {
    pub settings: Arc<Settings>,
    pub handle: Handle,
    pub hosts: Arc<HostPool>,
    pub broadcast: Arc<Broadcast>,
    pub reporter: Arc<dyn Reporter>,
    channel_identifiers: AtomicU64,
}

impl NetworkContext {
    pub fn next_channel_identifier(&self) -> u64 {
        self.channel_identifiers.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct Network {
    context: Arc<NetworkContext>,
    /// Present when this network owns its worker pool.
    pool: Mutex<Option<Threadpool>>,
    seed: Mutex<Option<Arc<SessionSeed>>>,
    inbound: Mutex<Option<Arc<SessionInbound>>>,
    outbound: Mutex<Option<Arc<SessionOutbound>>>,
    manual: Mutex<Option<Arc<SessionManual>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Network {
    /// Build with an owned worker pool sized by `settings.threads`.
    pub fn new(settings: Settings) -> Result<Self> {
        let pool = Threadpool::new(settings.threads)?;
        let handle = pool.handle();
        let network = Self::with_runtime(settings, handle, Arc::new(TracingReporter));
        *network.pool.lock().unwrap() = Some(pool);
        Ok(network)
    }

    /// Build over an existing runtime (embedding hosts, tests).
    pub fn with_runtime(settings: Settings, handle: Handle, reporter: Arc<dyn Reporter>) -> Self {
        let settings = Arc::new(settings);
        let hosts = HostPool::new(Strand::new(&handle), Arc::clone(&settings));
        let broadcast = Broadcast::new(Strand::new(&handle));

        let context = Arc::new(NetworkContext {
            settings,
            handle,
            hosts,
            broadcast,
            reporter,
            channel_identifiers: AtomicU64::new(1),
        });

        Self {
            context,
            pool: Mutex::new(None),
            seed: Mutex::new(None),
            inbound: Mutex::new(None),
            outbound: Mutex::new(None),
            manual: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<NetworkContext> {
        &self.context
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.context.settings
    }

    pub fn hosts(&self) -> &Arc<HostPool> {
        &self.context.hosts
    }

    pub fn handle(&self) -> Handle {
        self.context.handle.clone()
    }

    /// Endpoints the inbound session actually bound.
    pub fn bound_authorities(&self) -> Vec<Authority> {
        self.inbound
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| session.bound_authorities())
            .unwrap_or_default()
    }

    /// Live channels across every session.
    pub fn connection_count(&self) -> usize {
        let mut count = 0;
        if let Some(session) = self.seed.lock().unwrap().as_ref() {
            count += session.session().channel_count();
        }
        if let Some(session) = self.inbound.lock().unwrap().as_ref() {
            count += session.session().channel_count();
        }
        if let Some(session) = self.outbound.lock().unwrap().as_ref() {
            count += session.session().channel_count();
        }
        if let Some(session) = self.manual.lock().unwrap().as_ref() {
            count += session.session().channel_count();
        }
        count
    }

    /// Bring the node online. Seeding (when the pool is starving) runs
    /// to completion before the outreach sessions launch.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("network already started");
            return Ok(());
        }

        let context = &self.context;
        let loaded = context.hosts.load().await;
        tracing::info!("loaded {} hosts from {}", loaded, context.settings.host_file_path.display());

        if context.hosts.count().await == 0 && !context.settings.seeds.is_empty() {
            let seed = Arc::new(SessionSeed::new(Arc::clone(context)));
            *self.seed.lock().unwrap() = Some(Arc::clone(&seed));
            // A fruitless harvest is not fatal; outbound retries the pool.
            if let Err(code) = seed.start().await {
                tracing::warn!("seeding failed: {}", code);
            }
        }

        // Every long-running session must come up; the first failure
        // (typically a bind) wins the unity race and aborts the start.
        let mut unity = RaceUnity::new(3);
        let outcome: Arc<Mutex<Result<()>>> = Arc::new(Mutex::new(Ok(())));
        let verdict = Arc::clone(&outcome);
        unity.start(move |result| {
            *verdict.lock().unwrap() = result;
        });

        let inbound = Arc::new(SessionInbound::new(Arc::clone(context)));
        unity.finish(inbound.start().await);
        *self.inbound.lock().unwrap() = Some(inbound);

        let outbound = Arc::new(SessionOutbound::new(Arc::clone(context)));
        unity.finish(outbound.start().await);
        *self.outbound.lock().unwrap() = Some(outbound);

        let manual = Arc::new(SessionManual::new(Arc::clone(context)));
        unity.finish(manual.start().await);
        *self.manual.lock().unwrap() = Some(manual);

        let started = *outcome.lock().unwrap();
        if let Err(code) = started {
            tracing::warn!("network start failed: {}", code);
            self.stop().await;
            return Err(code);
        }

        tracing::info!("network started");
        Ok(())
    }

    /// Take the node offline: sessions, channels, pool persistence.
    /// Idempotent; the stop event fires on every path.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let count = self.connection_count();
        let reporter = Arc::clone(&self.context.reporter);
        let _latch = RaceAll::new(move |_| reporter.fire(Event::Stop, count));

        if let Some(session) = self.seed.lock().unwrap().take() {
            session.stop();
        }
        if let Some(session) = self.inbound.lock().unwrap().take() {
            session.stop();
        }
        if let Some(session) = self.outbound.lock().unwrap().take() {
            session.stop();
        }
        if let Some(session) = self.manual.lock().unwrap().take() {
            session.stop();
        }

        self.context.broadcast.stop(Error::ChannelStopped);

        if self.started.load(Ordering::SeqCst) {
            match self.context.hosts.save().await {
                Ok(()) => tracing::info!(
                    "saved hosts to {}",
                    self.context.settings.host_file_path.display()
                ),
                Err(code) => tracing::warn!("hosts save failed: {}", code),
            }
        }

        tracing::info!("network stopped");
    }

    /// Release the owned worker pool, abandoning remaining work.
    pub fn shutdown(&self) {
        if let Some(pool) = self.pool.lock().unwrap().take() {
            pool.shutdown();
        }
    }
}
