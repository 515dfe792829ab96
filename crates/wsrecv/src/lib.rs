//! Receive side of WebSocket-style connections.
//!
//! wsrecv turns an already-upgraded byte stream into application messages:
//! fragment reassembly, unmasking, per-message deflate, ping/pong/close
//! handling and per-message size limits, all behind per-call deadlines.
//!
//! # Crate Structure
//!
//! - [`frame`]: Wire layer (headers, masking, close codes, control-frame writer)
//! - [`conn`]: Connection layer ([`Conn`], [`MessageReader`], configuration)

/// Re-export frame types.
pub mod frame {
    pub use wsrecv_frame::*;
}

/// Re-export connection types.
pub mod conn {
    pub use wsrecv_conn::*;
}

pub use wsrecv_conn::{
    CompressionConfig, Conn, ConnConfig, ConnError, MessageReader, MessageType, ReadPhase, Role,
};
pub use wsrecv_frame::{CloseFrame, StatusCode};
