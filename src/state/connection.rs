//! Connection management.
//!
//! Owns the single transport for a client session, tracks its state, and
//! turns inbound text frames into [`ServerEvent`]s for the one registered
//! consumer. Sends are at-most-once: nothing is queued or retried while
//! disconnected.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::protocol::{ClientCommand, ServerEvent};
use crate::config::BackoffConfig;
use crate::error::{CommandError, TransportError};

/// Connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,

    /// Opening, or waiting to reopen after a drop
    Connecting,

    Connected,

    /// Transport failed; carries the reason
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Lifecycle and data notifications coming out of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; sends are possible
    Opened,

    /// One inbound text frame
    Frame(String),

    /// Connection dropped; another attempt is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },

    /// Connection closed
    Closed { reason: Option<String> },

    /// Transport-level failure
    Failed(String),

    /// The transport gave up or was shut down; nothing follows
    Stopped,
}

/// The wire underneath the connection manager.
///
/// Implementations must not block: `open` starts connecting and reports
/// the outcome later as a [`TransportEvent`], and `send_text` only queues.
pub trait Transport {
    fn open(&mut self) -> Result<(), TransportError>;

    fn send_text(&mut self, frame: String) -> Result<(), TransportError>;

    /// Must be safe to call any number of times.
    fn close(&mut self);
}

/// Exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Failures since the last [`reset`](Self::reset).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` once attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let factor = self.config.multiplier.max(1.0).powi(self.attempt.min(64) as i32);
        let millis = (self.config.initial_delay_ms as f64 * factor)
            .min(self.config.max_delay_ms as f64);
        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_millis(millis as u64))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

type MessageSink = Box<dyn FnMut(ServerEvent)>;

/// Connection manager for one client session.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    sink: Option<MessageSink>,
    /// Set by `close`, cleared by `connect`
    shut_down: bool,
    frames_sent: u64,
    frames_received: u64,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            sink: None,
            shut_down: false,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Start connecting. No-op while connecting or connected.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = %self.state, "connect() ignored");
            return Ok(());
        }

        self.shut_down = false;
        self.state = ConnectionState::Connecting;
        info!("Connecting");

        if let Err(e) = self.transport.open() {
            error!(error = %e, "Failed to open transport");
            self.state = ConnectionState::Error(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Register the single consumer of inbound events, replacing any
    /// previous one.
    pub fn on_message<F>(&mut self, sink: F)
    where
        F: FnMut(ServerEvent) + 'static,
    {
        self.sink = Some(Box::new(sink));
    }

    /// Encode and write a command. Fails with
    /// [`CommandError::NotConnected`] without touching the wire unless
    /// connected.
    pub fn send(&mut self, command: &ClientCommand) -> Result<(), CommandError> {
        if !self.is_connected() {
            warn!(event = command.name(), "Not connected, dropping send");
            return Err(CommandError::NotConnected);
        }

        let frame = command.encode().map_err(|e| CommandError::Encode {
            event: command.name(),
            message: e.to_string(),
        })?;

        if let Err(e) = self.transport.send_text(frame) {
            error!(event = command.name(), error = %e, "Send failed");
            self.state = ConnectionState::Error(e.to_string());
            return Err(CommandError::Transport(e.to_string()));
        }

        self.frames_sent += 1;
        debug!(event = command.name(), "Sent");
        Ok(())
    }

    /// Apply a transport notification. Inbound frames are decoded and handed
    /// to the registered consumer; undecodable frames are logged and dropped.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.shut_down {
                    debug!("Ignoring open after close");
                    return;
                }
                info!("Connected");
                self.state = ConnectionState::Connected;
            }
            TransportEvent::Frame(text) => {
                self.frames_received += 1;
                match ServerEvent::decode(&text) {
                    Ok(event) => {
                        debug!(event = %event.kind(), "Received");
                        match self.sink.as_mut() {
                            Some(sink) => sink(event),
                            None => warn!(event = %event.kind(), "No consumer registered"),
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable frame"),
                }
            }
            TransportEvent::Reconnecting { attempt, delay } => {
                if self.shut_down {
                    return;
                }
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
                self.state = ConnectionState::Connecting;
            }
            TransportEvent::Closed { reason } => {
                info!(reason = reason.as_deref().unwrap_or(""), "Disconnected");
                self.state = ConnectionState::Disconnected;
            }
            TransportEvent::Failed(message) => {
                error!(error = %message, "Transport error");
                self.state = ConnectionState::Error(message);
            }
            TransportEvent::Stopped => {
                info!("Transport stopped");
                // Keep the last failure visible
                if !matches!(self.state, ConnectionState::Error(_)) {
                    self.state = ConnectionState::Disconnected;
                }
            }
        }
    }

    /// Close the transport. Safe to call repeatedly.
    pub fn close(&mut self) {
        if !self.shut_down {
            info!("Closing connection");
        }
        self.shut_down = true;
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

impl<T: Transport + fmt::Debug> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("frames_sent", &self.frames_sent)
            .field("frames_received", &self.frames_received)
            .finish()
    }
}
