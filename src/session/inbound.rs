// Harbor Network Layer — Inbound Session
// Distributed under the MIT software license.

//! Acceptance loops: one per configured bind.
//!
//! Admission happens before the handshake: a full house or a blocked
//! authority closes the socket immediately. Self-connects surface later
//! as handshake failures (the nonce check).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Attachment, Session};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::config::authority::Authority;
use crate::net::acceptor::Acceptor;
use crate::net::network::NetworkContext;
use crate::runtime::strand::Strand;

/// Pause after a transient accept failure.
const ACCEPT_RETRY_DELAY_SECS: u64 = 1;

pub struct SessionInbound {
    session: Arc<Session>,
    bound: Mutex<Vec<Authority>>,
}

impl SessionInbound {
    pub(crate) fn new(context: Arc<NetworkContext>) -> Self {
        Self {
            session: Session::new(context, "inbound", Attachment::Full),
            bound: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    /// The endpoints actually bound (ports resolved).
    pub fn bound_authorities(&self) -> Vec<Authority> {
        self.bound.lock().unwrap().clone()
    }

    /// Bind every configured endpoint and launch its accept loop.
    pub async fn start(&self) -> Result<()> {
        let context = self.session.context();
        if context.settings.inbound_connections == 0 || context.settings.binds.is_empty() {
            tracing::info!("inbound session disabled");
            return Ok(());
        }

        for bind in &context.settings.binds {
            let strand = Strand::new(&context.handle);
            let acceptor = Arc::new(Acceptor::bind(strand, bind).await?);
            let authority = acceptor.local_authority();
            tracing::info!("listening on {}", authority);

            self.session.track_acceptor(&acceptor);
            self.bound.lock().unwrap().push(authority);

            let session = Arc::clone(&self.session);
            context
                .handle
                .spawn(async move { accept_loop(session, acceptor).await });
        }

        Ok(())
    }
}

async fn accept_loop(session: Arc<Session>, acceptor: Arc<Acceptor>) {
    loop {
        match acceptor.accept().await {
            Ok(socket) => {
                if session.is_stopped() {
                    socket.stop();
                    break;
                }

                let authority = socket.authority();
                let context = session.context();

                if session.channel_count() >= context.settings.inbound_connections as usize {
                    tracing::debug!("inbound full, dropping {}", authority);
                    socket.stop();
                    continue;
                }

                if context.settings.is_blocked(&authority) {
                    tracing::debug!("blocked inbound from {}", authority);
                    socket.stop();
                    continue;
                }

                context.reporter.fire(Event::Inbound, session.channel_count());

                let lifetime = context.settings.channel_expiration_secs();
                let channel = session.create_channel(socket, true, lifetime);

                let handshaking = Arc::clone(&session);
                context.handle.spawn(async move {
                    // Failures are logged and swallowed; the loop accepts on.
                    let _ = handshaking.start_channel(channel).await;
                });
            }
            Err(Error::OperationCanceled) => break,
            Err(code) => {
                tracing::warn!("accept failed: {}", code);
                if session
                    .sleep_or_stopped(Duration::from_secs(ACCEPT_RETRY_DELAY_SECS))
                    .await
                {
                    break;
                }
            }
        }
    }

    tracing::debug!("accept loop retired");
}
