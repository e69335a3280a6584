// Harbor Network Layer — Proxy
// Distributed under the MIT software license.

//! Framed message I/O over a socket.
//!
//! The read loop parses one frame at a time and hands it to the
//! distributor on the channel strand, awaiting each dispatch before the
//! next read so wire order is preserved end to end. Sends queue on a
//! single writer task, FIFO, with completions posted on the strand.
//!
//! Faults discovered here (bad magic, oversized payload, bad checksum,
//! decode failure, write failure) are routed through the fault hook so
//! the owning channel can run its full stop cascade.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use super::distributor::{Distributor, Routed, SubscriptionKey};
use super::socket::Socket;
use crate::config::authority::Authority;
use crate::config::settings::Settings;
use crate::error::{Error, Result};
use crate::message::codec::{Reader, Writer};
use crate::message::heading::{Heading, HEADING_SIZE};
use crate::message::identifier::Identifier;
use crate::message::{maximum_payload_for, serialize, Payload};
use crate::runtime::strand::Strand;
use crate::runtime::subscriber::{Notification, Subscriber};

type SendHandler = Box<dyn FnOnce(Result<()>) + Send>;
type FaultHook = Arc<dyn Fn(Error) + Send + Sync>;
type ActivityHook = Arc<dyn Fn() + Send + Sync>;

struct PendingSend {
    identifier: Identifier,
    frame: Vec<u8>,
    handler: SendHandler,
}

pub struct Proxy {
    socket: Arc<Socket>,
    magic: u32,
    maximum_payload: usize,
    /// Protocol level driving payload codecs; updated at handshake.
    negotiated: AtomicU32,
    // Arc'd so strand closures can carry them without borrowing self;
    // locked only from the strand, never across an await.
    distributor: Arc<Mutex<Distributor>>,
    stop_subscriber: Arc<Mutex<Subscriber<()>>>,
    sends: mpsc::UnboundedSender<PendingSend>,
    queued: Mutex<Option<mpsc::UnboundedReceiver<PendingSend>>>,
    /// Ends the writer task so its `Arc<Proxy>` does not pin the channel.
    halt: watch::Sender<bool>,
    /// Paused reads: frames stay in the kernel until resumed. The
    /// handshake pauses the channel so no steady-state frame can slip
    /// past before its protocols have subscribed.
    paused: watch::Sender<bool>,
    resumed: AtomicBool,
    stopped: AtomicBool,
    stop_code: Mutex<Option<Error>>,
    fault_hook: Mutex<Option<FaultHook>>,
    activity_hook: Mutex<Option<ActivityHook>>,
}

impl Proxy {
    pub fn new(socket: Socket, settings: &Settings) -> Arc<Self> {
        let (sends, receiver) = mpsc::unbounded_channel();
        let (halt, _) = watch::channel(false);
        let (paused, _) = watch::channel(false);

        Arc::new(Self {
            socket: Arc::new(socket),
            magic: settings.network_magic,
            maximum_payload: settings.maximum_payload as usize,
            negotiated: AtomicU32::new(settings.protocol_minimum),
            distributor: Arc::new(Mutex::new(Distributor::new())),
            stop_subscriber: Arc::new(Mutex::new(Subscriber::new())),
            sends,
            queued: Mutex::new(Some(receiver)),
            halt,
            paused,
            resumed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_code: Mutex::new(None),
            fault_hook: Mutex::new(None),
            activity_hook: Mutex::new(None),
        })
    }

    pub fn strand(&self) -> &Strand {
        self.socket.strand()
    }

    pub fn authority(&self) -> Authority {
        self.socket.authority()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The code the channel stopped with, once stopped.
    pub fn stop_code(&self) -> Error {
        self.stop_code.lock().unwrap().unwrap_or(Error::ChannelStopped)
    }

    pub fn negotiated(&self) -> u32 {
        self.negotiated.load(Ordering::SeqCst)
    }

    pub fn set_negotiated(&self, version: u32) {
        self.negotiated.store(version, Ordering::SeqCst);
    }

    /// The owning channel's stop entry point; faults route through it so
    /// timers and negotiation state are torn down with the I/O.
    pub fn set_fault_hook(&self, hook: FaultHook) {
        *self.fault_hook.lock().unwrap() = Some(hook);
    }

    /// Invoked after every completely received frame.
    pub fn set_activity_hook(&self, hook: ActivityHook) {
        *self.activity_hook.lock().unwrap() = Some(hook);
    }

    /// Arm the read loop and the writer task. Idempotent.
    pub fn resume(self: &Arc<Self>) {
        if self.resumed.swap(true, Ordering::SeqCst) || self.is_stopped() {
            return;
        }

        if let Some(receiver) = self.queued.lock().unwrap().take() {
            let this = Arc::clone(self);
            self.strand().handle().spawn(async move { this.write_loop(receiver).await });
        }

        let this = Arc::clone(self);
        self.strand().handle().spawn(async move { this.read_loop().await });
    }

    // =========================================================================
    // READ PATH
    // =========================================================================

    /// Hold reads after the current frame; stop wakes the wait.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_reading(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    async fn wait_while_paused(&self) {
        let mut paused = self.paused.subscribe();
        while *paused.borrow_and_update() && !self.is_stopped() {
            if paused.changed().await.is_err() {
                break;
            }
        }
    }

    async fn read_loop(self: Arc<Self>) {
        loop {
            if self.is_stopped() {
                break;
            }

            self.wait_while_paused().await;
            if self.is_stopped() {
                break;
            }

            match self.read_frame().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(code) => {
                    if !self.is_stopped() {
                        self.fault(code);
                    }
                    break;
                }
            }
        }
    }

    /// Read and dispatch one frame; `Ok(false)` means the lane is gone.
    async fn read_frame(&self) -> Result<bool> {
        let mut heading_bytes = [0u8; HEADING_SIZE];
        self.socket.read_exact(&mut heading_bytes).await?;

        let heading = Heading::read(&mut Reader::new(&heading_bytes))?;
        if heading.magic != self.magic {
            return Err(Error::InvalidMagic);
        }

        // Unknown commands are consumed; the distributor drops them.
        let identifier = heading.identifier()?;

        let size = heading.payload_size as usize;
        if size > maximum_payload_for(identifier, self.maximum_payload) {
            tracing::warn!(
                "oversized {} payload from {} ({} bytes)",
                identifier,
                self.authority(),
                size
            );
            return Err(Error::OversizedPayload);
        }

        let mut body = vec![0u8; size];
        self.socket.read_exact(&mut body).await?;

        if !heading.verify_checksum(&body) {
            return Err(Error::InvalidChecksum);
        }

        tracing::trace!("recv {} from {} ({} bytes)", identifier, self.authority(), size);

        if let Some(activity) = self.activity_hook.lock().unwrap().clone() {
            activity();
        }

        self.dispatch(identifier, body).await
    }

    async fn dispatch(&self, identifier: Identifier, body: Vec<u8>) -> Result<bool> {
        let version = self.negotiated();
        let distributor = Arc::clone(&self.distributor);

        let outcome = self
            .strand()
            .run(move || distributor.lock().unwrap().notify(identifier, &body, version))
            .await;

        match outcome {
            Ok(Ok(())) => Ok(true),
            Ok(Err(code)) => Err(code),
            // Strand gone: the pool is tearing down.
            Err(_) => Ok(false),
        }
    }

    // =========================================================================
    // WRITE PATH
    // =========================================================================

    /// Serialize and queue a message; the completion runs on the strand.
    pub fn send<M: Payload>(
        &self,
        message: &M,
        handler: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let version = self.negotiated();
        let body = serialize(message, version);
        let heading = Heading::for_payload(self.magic, M::IDENTIFIER.command(), &body);

        let mut writer = Writer::with_capacity(HEADING_SIZE + body.len());
        heading.write(&mut writer);
        writer.write_bytes(&body);

        self.send_frame(M::IDENTIFIER, writer.into_bytes(), Box::new(handler));
    }

    fn send_frame(&self, identifier: Identifier, frame: Vec<u8>, handler: SendHandler) {
        if self.is_stopped() {
            let code = self.stop_code();
            self.strand().post(move || handler(Err(code)));
            return;
        }

        let entry = PendingSend { identifier, frame, handler };
        if let Err(returned) = self.sends.send(entry) {
            let handler = returned.0.handler;
            self.strand().post(move || handler(Err(Error::ChannelStopped)));
        }
    }

    async fn write_loop(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<PendingSend>) {
        let mut halt = self.halt.subscribe();

        while !*halt.borrow_and_update() {
            let entry = tokio::select! {
                biased;
                _ = halt.changed() => break,
                entry = receiver.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let posted = match self.socket.write_all(&entry.frame).await {
                Ok(()) => {
                    tracing::trace!(
                        "sent {} to {} ({} bytes)",
                        entry.identifier,
                        self.authority(),
                        entry.frame.len()
                    );
                    Ok(())
                }
                Err(code) => {
                    if !self.is_stopped() {
                        self.fault(code);
                    }
                    Err(if self.is_stopped() { self.stop_code() } else { code })
                }
            };

            let handler = entry.handler;
            self.strand().post(move || handler(posted));
        }

        // Drain whatever was queued behind the stop with the stop code.
        receiver.close();
        while let Ok(entry) = receiver.try_recv() {
            let code = self.stop_code();
            let handler = entry.handler;
            self.strand().post(move || handler(Err(code)));
        }
    }

    // =========================================================================
    // SUBSCRIPTIONS (strand-only)
    // =========================================================================

    pub fn subscribe_message<M: Routed>(
        &self,
        key: SubscriptionKey,
        handler: impl FnMut(&Notification<M>) -> bool + Send + 'static,
    ) -> bool {
        self.distributor.lock().unwrap().subscribe(key, handler)
    }

    pub fn unsubscribe_message<M: Routed>(&self, key: SubscriptionKey) -> bool {
        self.distributor.lock().unwrap().unsubscribe::<M>(key)
    }

    /// Register for the terminal stop notification.
    pub fn subscribe_stop(&self, handler: impl FnMut(&Notification<()>) + Send + 'static) -> bool {
        self.stop_subscriber.lock().unwrap().subscribe(handler)
    }

    // =========================================================================
    // STOP
    // =========================================================================

    /// Route a locally discovered fault into the owning channel's stop.
    pub(crate) fn fault(&self, code: Error) {
        let hook = self.fault_hook.lock().unwrap().clone();
        match hook {
            Some(hook) => hook(code),
            None => {
                if self.begin_stop(code) {
                    self.finish_stop(code);
                }
            }
        }
    }

    /// First phase: transition to stopped and cancel socket I/O.
    /// True exactly once; later calls are no-ops.
    pub(crate) fn begin_stop(&self, code: Error) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }

        *self.stop_code.lock().unwrap() = Some(code);
        self.socket.stop();
        let _ = self.halt.send(true);
        // Wake a paused read loop so it can observe the stop.
        self.paused.send_replace(false);
        true
    }

    /// Final phase: drain subscribers with the stop code, strictly after
    /// any dispatch already queued on the strand.
    ///
    /// Always posted, never inline: a handler may stop its own channel
    /// from inside a dispatch, while the distributor lock is held.
    pub(crate) fn finish_stop(&self, code: Error) {
        let distributor = Arc::clone(&self.distributor);
        let stop_subscriber = Arc::clone(&self.stop_subscriber);
        self.strand().post(move || {
            distributor.lock().unwrap().stop(code);
            stop_subscriber.lock().unwrap().stop(code);
        });
    }
}
