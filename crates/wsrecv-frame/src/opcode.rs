//! Frame opcodes.
//!
//! Opcodes 0x0-0x7 are data opcodes, 0x8-0xF are control opcodes.
//! Only six of the sixteen values are assigned; the rest are reserved and
//! must be rejected by a receiver.

/// Continuation of a fragmented data message.
pub const CONTINUATION: u8 = 0x0;
/// First frame of a UTF-8 text message.
pub const TEXT: u8 = 0x1;
/// First frame of a binary message.
pub const BINARY: u8 = 0x2;
/// Connection close.
pub const CLOSE: u8 = 0x8;
/// Keepalive request.
pub const PING: u8 = 0x9;
/// Keepalive response.
pub const PONG: u8 = 0xA;

const OPCODE_MASK: u8 = 0b0000_1111;
const CONTROL_BIT: u8 = 0b0000_1000;

/// A decoded 4-bit opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any unassigned value, kept so it can be reported.
    Reserved(u8),
}

impl Opcode {
    /// Decode from the low nibble of `byte`; the high nibble is ignored.
    pub fn from_u8(byte: u8) -> Self {
        match byte & OPCODE_MASK {
            CONTINUATION => Self::Continuation,
            TEXT => Self::Text,
            BINARY => Self::Binary,
            CLOSE => Self::Close,
            PING => Self::Ping,
            PONG => Self::Pong,
            other => Self::Reserved(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => CONTINUATION,
            Self::Text => TEXT,
            Self::Binary => BINARY,
            Self::Close => CLOSE,
            Self::Ping => PING,
            Self::Pong => PONG,
            Self::Reserved(value) => value & OPCODE_MASK,
        }
    }

    /// Returns true for close, ping, pong and the reserved control range.
    pub fn is_control(self) -> bool {
        self.as_u8() & CONTROL_BIT == CONTROL_BIT
    }

    /// Returns true for continuation, text and binary.
    pub fn is_data(self) -> bool {
        matches!(self, Self::Continuation | Self::Text | Self::Binary)
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Reserved(_) => "reserved",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reserved(value) => write!(f, "reserved({value:#x})"),
            other => f.write_str(other.name()),
        }
    }
}
