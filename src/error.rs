//! Error types.

use thiserror::Error;

use crate::state::lobby::LobbyError;
use crate::state::phase::InvalidTransition;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has no open connection to write to.
    #[error("Transport is not open")]
    NotOpen,

    /// No async runtime is available to drive the connection.
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// The outbound channel to the connection task is gone.
    #[error("Outbound channel closed: {0}")]
    ChannelClosed(String),

    /// Catch-all for socket failures.
    #[error("Transport failure: {0}")]
    Other(String),
}

/// Inbound frames that could not be turned into a [`crate::ServerEvent`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Invalid payload for '{event}': {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Reasons a command was rejected before anything was sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Lobby name is required")]
    EmptyLobbyName,

    #[error("Lobby ID is required")]
    EmptyLobbyId,

    #[error("Pin is required for private lobbies")]
    MissingPin,

    #[error("Pin must be exactly 4 digits")]
    InvalidPin,

    #[error("You are not in a lobby")]
    NotInLobby,

    #[error("Need 2 players to ready up")]
    RosterNotFull,

    #[error("Game already in progress")]
    AlreadyStarted,

    #[error("Game is not in progress")]
    NotPlaying,

    #[error("Code cannot be empty")]
    EmptyCode,

    #[error("Failed to encode '{event}': {message}")]
    Encode { event: &'static str, message: String },

    #[error("Send failed: {0}")]
    Transport(String),
}

/// Server events the lobby state refused to apply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Roster(#[from] LobbyError),

    #[error("Stale event: seq {seq} is not after {last}")]
    Stale { seq: u64, last: u64 },

    #[error("No current lobby")]
    NoLobby,
}

/// Preference persistence failures.
#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Preferences IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preferences are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid websocket URL '{0}': must start with ws:// or wss://")]
    InvalidUrl(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Prefs(#[from] PrefsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
