use std::sync::Arc;

use wsrecv_frame::{CloseFrame, FrameError, StatusCode};

/// Errors that can occur on a connection's read path.
///
/// Cloneable: the first fatal error is recorded as the connection's close
/// state and handed back to every later operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnError {
    /// The peer broke the framing protocol, or the caller broke the
    /// read-to-completion contract.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A message exceeded the configured read limit.
    #[error("read limited at {limit} bytes")]
    ReadLimited { limit: u64 },

    /// The peer sent a valid close frame.
    #[error("received close frame: {0}")]
    ClosedByPeer(CloseFrame),

    /// This side closed the connection.
    #[error("connection closed locally: {0}")]
    ClosedLocally(CloseFrame),

    /// The underlying stream failed.
    #[error("transport error: {0}")]
    Transport(Arc<std::io::Error>),

    /// The underlying stream ended without a close frame.
    #[error("connection lost (stream ended without a close frame)")]
    ConnectionLost,

    /// A compressed message could not be inflated.
    #[error("failed to decompress message: {0}")]
    Decompress(String),

    /// A control frame payload did not arrive within the control timeout.
    #[error("timed out reading control frame payload")]
    ControlTimeout,

    /// The per-call deadline elapsed. The connection stays open.
    #[error("read deadline exceeded")]
    DeadlineExceeded,

    /// The read side was handed to the drain task.
    #[error("read side is owned by the drain task")]
    ReadClosed,

    /// Frame-level error outside the read path.
    #[error("frame error: {0}")]
    Frame(Arc<FrameError>),
}

impl ConnError {
    /// Status code of a close frame behind this error, if any.
    pub fn close_status(&self) -> Option<StatusCode> {
        match self {
            Self::ClosedByPeer(frame) | Self::ClosedLocally(frame) => Some(frame.code),
            _ => None,
        }
    }

    /// Whether this error closed (or reports a closed) connection.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DeadlineExceeded | Self::ReadClosed)
    }
}

impl From<std::io::Error> for ConnError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl From<FrameError> for ConnError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(io) => Self::Transport(Arc::new(io)),
            FrameError::ConnectionClosed => Self::ConnectionLost,
            other => Self::Frame(Arc::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_status_only_for_close_errors() {
        let peer = ConnError::ClosedByPeer(CloseFrame::new(StatusCode::GOING_AWAY, "bye"));
        assert_eq!(peer.close_status(), Some(StatusCode::GOING_AWAY));
        assert_eq!(ConnError::ConnectionLost.close_status(), None);
    }

    #[test]
    fn deadline_is_not_fatal() {
        assert!(!ConnError::DeadlineExceeded.is_fatal());
        assert!(!ConnError::ReadClosed.is_fatal());
        assert!(ConnError::Protocol("x".into()).is_fatal());
        assert!(ConnError::ReadLimited { limit: 1 }.is_fatal());
    }

    #[test]
    fn frame_io_maps_to_transport() {
        let err: ConnError = FrameError::Io(std::io::Error::other("boom")).into();
        assert!(matches!(err, ConnError::Transport(_)));

        let err: ConnError = FrameError::ConnectionClosed.into();
        assert!(matches!(err, ConnError::ConnectionLost));

        let err: ConnError = FrameError::InvalidLength(1 << 63).into();
        assert!(matches!(err, ConnError::Frame(_)));
    }

    #[test]
    fn display_includes_close_reason() {
        let err = ConnError::ClosedByPeer(CloseFrame::new(StatusCode::NORMAL_CLOSURE, "done"));
        assert_eq!(
            err.to_string(),
            "received close frame: status = NormalClosure(1000) and reason = \"done\""
        );
    }
}
