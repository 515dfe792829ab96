use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use wsrecv_frame::CloseFrame;

use crate::error::ConnError;

/// Where the read side of a connection currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadPhase {
    /// No message is being read.
    Idle = 0,
    /// A caller is waiting for the next data frame.
    AwaitingFrame = 1,
    /// A message reader is open and not yet at end-of-message.
    InMessage = 2,
    /// Terminal.
    Closed = 3,
}

impl ReadPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::AwaitingFrame,
            2 => Self::InMessage,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingFrame => "awaiting_frame",
            Self::InMessage => "in_message",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`ReadPhase`]. Once `Closed`, it never changes again.
#[derive(Debug)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ReadPhase::Idle as u8))
    }

    pub(crate) fn get(&self) -> ReadPhase {
        ReadPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, phase: ReadPhase) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ReadPhase::Closed as u8).then_some(phase as u8)
            });
    }
}

/// Close State: the first fatal error wins and is reported forever after.
#[derive(Debug)]
pub(crate) struct CloseState {
    err: OnceLock<ConnError>,
    peer_close: OnceLock<CloseFrame>,
    token: CancellationToken,
}

impl CloseState {
    pub(crate) fn new() -> Self {
        Self {
            err: OnceLock::new(),
            peer_close: OnceLock::new(),
            token: CancellationToken::new(),
        }
    }

    /// Record `err` unless an error is already recorded. Returns the recorded error.
    pub(crate) fn record(&self, err: ConnError) -> ConnError {
        let mut fresh = false;
        let recorded = self.err.get_or_init(|| {
            fresh = true;
            err
        });
        if fresh {
            debug!(error = %recorded, "recorded connection close state");
        }
        recorded.clone()
    }

    /// The recorded error, or `ConnectionLost` if teardown happened without one.
    pub(crate) fn error(&self) -> ConnError {
        self.err.get().cloned().unwrap_or(ConnError::ConnectionLost)
    }

    pub(crate) fn get(&self) -> Option<ConnError> {
        self.err.get().cloned()
    }

    pub(crate) fn set_peer_close(&self, frame: CloseFrame) {
        let _ = self.peer_close.set(frame);
    }

    pub(crate) fn peer_close(&self) -> Option<&CloseFrame> {
        self.peer_close.get()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}
