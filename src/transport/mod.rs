//! Transport implementations.
//!
//! The core only sees the [`Transport`](crate::state::connection::Transport)
//! trait; this module provides the real websocket wire.

pub mod ws;

pub use ws::WsTransport;
