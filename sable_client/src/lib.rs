//! An event-driven IRC client connection.
//!
//! A [`Connection`] owns the socket to one server. Inbound lines are framed
//! into [`Event`]s and dispatched to handlers registered by event code;
//! outbound [`Command`]s go through a bounded queue drained by a dedicated
//! write task; a keepalive task pings the server and recovers the desired
//! nick. Transport failures are logged and followed by automatic
//! reconnection for as long as [`Connection::run`] is driving the connection.
//!
//! No channel or membership state is tracked.

pub mod address;
pub use address::ServerAddress;

pub mod error;
pub use error::*;

pub mod id;
pub use id::CallbackId;

pub mod event;
pub use event::Event;

pub mod callbacks;
pub use callbacks::{Callback, CallbackRegistry, WILDCARD};

pub mod command;
pub use command::Command;

pub mod config;
pub use config::*;

pub mod tracing_config;

pub mod connection;
pub use connection::{Connection, RECONNECT_BACKOFF};

mod internal {
    pub mod identity;
    pub use identity::*;
    pub mod session;
    pub use session::*;
    pub mod read_task;
    pub use read_task::*;
    pub mod write_task;
    pub use write_task::*;
    pub mod ping_task;
    pub use ping_task::*;
    pub mod tls;
}
