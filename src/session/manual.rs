// Harbor Network Layer — Manual Session
// Distributed under the MIT software license.

//! Pinned peers: one maintenance loop per configured peer, reconnecting
//! forever under exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use super::{wait_for_stop, Attachment, Session};
use crate::config::authority::Authority;
use crate::error::{Error, Result};
use crate::net::connector::Connector;
use crate::net::network::NetworkContext;
use crate::runtime::strand::Strand;

/// Initial retry delay for failed connections.
const INITIAL_RETRY_DELAY_SECS: u64 = 10;

/// Delay cap; a pinned peer that might recover is never abandoned.
const MAX_RETRY_DELAY_SECS: u64 = 3600;

/// Backoff factor: 10s, 20s, 40s, ... capped.
const RETRY_BACKOFF_FACTOR: u64 = 2;

/// Delay before redialing a peer that disconnected cleanly.
const RECONNECT_DELAY_SECS: u64 = 1;

/// Retry tracking with exponential backoff.
#[derive(Debug, Clone)]
struct RetryInfo {
    attempts: u32,
    next_delay: u64,
}

impl RetryInfo {
    fn new() -> Self {
        Self { attempts: 0, next_delay: INITIAL_RETRY_DELAY_SECS }
    }

    fn record_failure(&mut self) -> Duration {
        self.attempts += 1;
        let delay = self.next_delay;
        self.next_delay = (self.next_delay * RETRY_BACKOFF_FACTOR).min(MAX_RETRY_DELAY_SECS);
        Duration::from_secs(delay)
    }

    fn record_success(&mut self) {
        self.attempts = 0;
        self.next_delay = INITIAL_RETRY_DELAY_SECS;
    }
}

pub struct SessionManual {
    session: Arc<Session>,
}

impl SessionManual {
    pub(crate) fn new(context: Arc<NetworkContext>) -> Self {
        Self { session: Session::new(context, "manual", Attachment::Full) }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    pub async fn start(&self) -> Result<()> {
        let peers = self.session.context().settings.peers.clone();
        if peers.is_empty() {
            return Ok(());
        }

        for peer in peers {
            let session = Arc::clone(&self.session);
            self.session
                .context()
                .handle
                .spawn(async move { maintain(session, peer).await });
        }

        Ok(())
    }
}

async fn maintain(session: Arc<Session>, peer: Authority) {
    let mut retry = RetryInfo::new();

    while !session.is_stopped() {
        let delay = match connect_once(&session, peer).await {
            Ok(()) => {
                retry.record_success();
                Duration::from_secs(RECONNECT_DELAY_SECS)
            }
            Err(Error::OperationCanceled) | Err(Error::ChannelStopped) if session.is_stopped() => {
                break;
            }
            Err(code) => {
                let delay = retry.record_failure();
                tracing::debug!(
                    "manual peer {} failed ({}), retry in {:?} (attempt {})",
                    peer,
                    code,
                    delay,
                    retry.attempts
                );
                delay
            }
        };

        if session.sleep_or_stopped(delay).await {
            break;
        }
    }

    tracing::debug!("manual loop for {} retired", peer);
}

/// One connect/handshake/hold cycle.
async fn connect_once(session: &Arc<Session>, peer: Authority) -> Result<()> {
    let context = session.context();

    let connector = Arc::new(Connector::new(
        Strand::new(&context.handle),
        context.settings.connect_timeout_secs(),
    ));
    session.track_connector(&connector);

    let socket = connector.connect(peer).await?;
    let lifetime = context.settings.channel_expiration_secs();
    let channel = session.create_channel(socket, false, lifetime);

    session.start_channel(Arc::clone(&channel)).await?;
    wait_for_stop(&channel).await;
    Ok(())
}
