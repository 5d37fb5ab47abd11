//! ShibaCoder Sync Library
//!
//! Client-side synchronization core for ShibaCoder, a two-player
//! competitive coding game played over one websocket connection.
//!
//! # Overview
//!
//! - **Connection Management** - One transport per session, typed JSON
//!   envelopes, reconnect with backoff.
//!
//! - **Event Bus** - Inbound events routed to handlers by event name.
//!
//! - **Lobby State** - Lobby list, current lobby and its roster, folded from
//!   server events through a phase state machine.
//!
//! - **Game State** - Problem, latest test result, final outcome.
//!
//! # Design Principles
//!
//! 1. **The server is authoritative** - Local state only ever mirrors what
//!    the server said; commands are validated locally and then sent.
//!
//! 2. **State machines validate transitions** - Events that don't fit the
//!    current phase are rejected without touching state.
//!
//! 3. **No ambient globals** - Collaborators receive a [`SyncClient`] or a
//!    [`Snapshot`] explicitly.
//!
//! 4. **Transport is pluggable** - The core never blocks; the websocket
//!    implementation lives in [`transport::ws`].
//!
//! # Example
//!
//! ```rust,no_run
//! use shibacoder_sync::config::ClientConfig;
//! use shibacoder_sync::prefs::MemoryStore;
//! use shibacoder_sync::transport::ws::WsTransport;
//! use shibacoder_sync::{CreateLobby, SyncClient, TransportEvent};
//!
//! # async fn demo() -> Result<(), shibacoder_sync::SyncError> {
//! let config = ClientConfig::from_env()?;
//! let (transport, mut events) =
//!     WsTransport::new(&config.ws_url, config.backoff.clone(), config.ping_interval());
//! let mut client = SyncClient::new(transport, config, MemoryStore::new());
//!
//! client.connect()?;
//! // Returns None once the transport gives up or is closed
//! while let Some(event) = client.next(&mut events).await {
//!     if event == TransportEvent::Opened {
//!         client.create_lobby(CreateLobby::public("Epic Coders Arena").as_player("Ada"))?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod prefs;
pub mod state;
pub mod transport;

// Re-export everything from state module at crate root
pub use error::{
    ApplyError, CommandError, ConfigError, PrefsError, ProtocolError, SyncError, TransportError,
};
pub use state::*;
