/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A 64-bit payload length had its most significant bit set.
    #[error("invalid frame payload length {0:#x}")]
    InvalidLength(u64),

    /// A control frame payload exceeded 125 bytes.
    #[error("control frame payload too large ({size} bytes, max {max})")]
    ControlTooLarge { size: usize, max: usize },

    /// A data opcode was passed where a control opcode is required.
    #[error("opcode {0} is not a control opcode")]
    NotControl(crate::Opcode),

    /// A close frame payload could not be parsed.
    #[error("invalid close payload: {0}")]
    InvalidClosePayload(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
