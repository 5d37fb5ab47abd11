//! Websocket transport.
//!
//! A background task owns the socket and reconnects with exponential
//! backoff whenever it drops. Everything it observes is reported as a
//! [`TransportEvent`] on an unbounded channel; the caller feeds those into
//! the core. Outbound frames go through a channel that only exists while
//! a socket is open, so sends while disconnected fail instead of queueing.
//!
//! Every `open` starts a new generation. A task left over from before a
//! `close` can still be finishing its close handshake; it may no longer
//! touch the outbound slot or report events once a newer task exists.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_channel::mpsc::{
    unbounded, UnboundedReceiver as FrameReceiver, UnboundedSender as FrameSender,
};
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::config::BackoffConfig;
use crate::error::TransportError;
use crate::state::connection::{Backoff, Transport, TransportEvent};

/// Outbound sender of the live socket, owned by the newest generation.
#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    sender: Option<FrameSender<String>>,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Websocket [`Transport`] backed by tokio-tungstenite.
///
/// `open` must be called from within a tokio runtime.
pub struct WsTransport {
    url: String,
    backoff: BackoffConfig,
    ping_interval: Duration,
    events: UnboundedSender<TransportEvent>,
    slot: SharedSlot,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    /// Create the transport and the receiver its notifications arrive on.
    pub fn new(
        url: impl Into<String>,
        backoff: BackoffConfig,
        ping_interval: Duration,
    ) -> (Self, UnboundedReceiver<TransportEvent>) {
        let (events, rx) = unbounded_channel();
        (
            Self {
                url: url.into(),
                backoff,
                ping_interval,
                events,
                slot: Arc::new(Mutex::new(Slot::default())),
                shutdown: None,
                task: None,
            },
            rx,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Transport for WsTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.is_running() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::NoRuntime(e.to_string()))?;

        let generation = {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            slot.sender = None;
            slot.generation
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let session = Session {
            url: self.url.clone(),
            generation,
            backoff: Backoff::new(self.backoff.clone()),
            ping_interval: self.ping_interval.max(Duration::from_millis(100)),
            events: self.events.clone(),
            slot: self.slot.clone(),
            shutdown: shutdown_rx,
        };

        debug!(url = %self.url, generation, "Starting websocket task");
        self.shutdown = Some(shutdown);
        self.task = Some(runtime.spawn(session.run()));
        Ok(())
    }

    fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        let slot = lock(&self.slot);
        let sender = slot.sender.as_ref().ok_or(TransportError::NotOpen)?;
        sender
            .unbounded_send(frame)
            .map_err(|e| TransportError::ChannelClosed(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            debug!(url = %self.url, "Shutting down websocket");
            let _ = shutdown.send(true);
        }
        lock(&self.slot).sender = None;
        self.task.take();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Why one connected session ended.
enum SessionEnd {
    Shutdown,
    Dropped(Option<String>),
}

/// State owned by the background task.
struct Session {
    url: String,
    generation: u64,
    backoff: Backoff,
    ping_interval: Duration,
    events: UnboundedSender<TransportEvent>,
    slot: SharedSlot,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    /// Report an event, unless a newer `open` has replaced this task.
    fn emit(&self, event: TransportEvent) {
        let slot = lock(&self.slot);
        if slot.generation != self.generation {
            trace!(generation = self.generation, ?event, "Dropping event from replaced task");
            return;
        }
        if self.events.send(event).is_err() {
            trace!("Transport event receiver dropped");
        }
    }

    fn install(&self, sender: FrameSender<String>) {
        let mut slot = lock(&self.slot);
        if slot.generation == self.generation {
            slot.sender = Some(sender);
        }
    }

    fn release(&self) {
        let mut slot = lock(&self.slot);
        if slot.generation == self.generation {
            slot.sender = None;
        }
    }

    async fn run(mut self) {
        self.connect_loop().await;
        self.emit(TransportEvent::Stopped);
        debug!(url = %self.url, generation = self.generation, "Websocket task finished");
    }

    async fn connect_loop(&mut self) {
        loop {
            debug!(url = %self.url, "Connecting to websocket");
            let connected = select! {
                result = connect_async(self.url.as_str()) => result,
                _ = self.shutdown.changed() => {
                    debug!("Cancelling connect");
                    return;
                }
            };

            match connected {
                Ok((stream, _)) => {
                    if self.backoff.attempt() > 0 {
                        info!(url = %self.url, "Websocket reconnected");
                    }
                    self.backoff.reset();

                    let (tx, rx) = unbounded();
                    self.install(tx);
                    self.emit(TransportEvent::Opened);

                    let end = self.session(stream, rx).await;
                    self.release();

                    match end {
                        SessionEnd::Shutdown => {
                            self.emit(TransportEvent::Closed { reason: None });
                            return;
                        }
                        SessionEnd::Dropped(reason) => {
                            warn!(reason = reason.as_deref().unwrap_or(""), "Websocket dropped");
                            self.emit(TransportEvent::Closed { reason });
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Websocket connect failed");
                    self.emit(TransportEvent::Failed(e.to_string()));
                }
            }

            let Some(delay) = self.backoff.next_delay() else {
                self.emit(TransportEvent::Failed(format!(
                    "Gave up after {} reconnect attempts",
                    self.backoff.attempt()
                )));
                return;
            };
            self.emit(TransportEvent::Reconnecting {
                attempt: self.backoff.attempt(),
                delay,
            });

            select! {
                () = sleep(delay) => {}
                _ = self.shutdown.changed() => return,
            }
        }
    }

    async fn session(
        &mut self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        mut outbound: FrameReceiver<String>,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let mut pinger = tokio::time::interval(self.ping_interval);
        // First tick is immediate
        pinger.tick().await;

        loop {
            select! {
                _ = self.shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                frame = outbound.next() => {
                    let Some(text) = frame else {
                        return SessionEnd::Shutdown;
                    };
                    trace!(len = text.len(), "Sending text frame");
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        return SessionEnd::Dropped(Some(e.to_string()));
                    }
                }
                _ = pinger.tick() => {
                    trace!("Sending ping");
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        return SessionEnd::Dropped(Some(e.to_string()));
                    }
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.emit(TransportEvent::Frame(text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Dropped(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(other)) => trace!(?other, "Ignoring non-text message"),
                    Some(Err(e)) => return SessionEnd::Dropped(Some(e.to_string())),
                    None => return SessionEnd::Dropped(None),
                },
            }
        }
    }
}
