//! Message reception for WebSocket-style connections.
//!
//! [`Conn`] turns a byte stream of protocol frames into whole application
//! messages:
//! - Continuation frames are reassembled into one streaming [`MessageReader`]
//! - Ping, pong and close frames are answered inline, even mid-message
//! - Per-message deflate with optional context takeover
//! - A per-message byte limit, enforced with a message-too-big close
//! - Per-call deadlines that abandon only the call, never the connection
//!
//! Any protocol violation, limit breach or transport failure closes the
//! connection; the first such error is kept and returned by every later call.

mod conn;
mod control;
mod frame_loop;
mod inflate;
mod limit;
mod reader;
mod source;
mod state;
mod window;

pub mod config;
pub mod error;

pub use config::{
    CompressionConfig, ConnConfig, Role, DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONTROL_TIMEOUT,
    DEFAULT_READ_LIMIT,
};
pub use conn::Conn;
pub use error::{ConnError, Result};
pub use inflate::DEFLATE_TAIL;
pub use reader::{MessageReader, MessageType};
pub use state::ReadPhase;
pub use tokio::time::Instant;
pub use window::WINDOW_SIZE;
