//! WebSocket wire layer for the receive path.
//!
//! Everything here is a pure function of bytes, except [`ControlWriter`]:
//! - Frame header decode/encode with 7/16/64-bit lengths and mask keys
//! - Rolling XOR masking
//! - Close status catalogue and close payload parsing
//! - Emission of the control frames a receiver has to send back

pub mod close;
pub mod error;
pub mod header;
pub mod mask;
pub mod opcode;
pub mod writer;

pub use close::{CloseFrame, StatusCode, MAX_CLOSE_REASON};
pub use error::{FrameError, Result};
pub use header::{decode_header, encode_header, FrameHeader, MAX_CONTROL_PAYLOAD, MAX_HEADER_SIZE};
pub use mask::apply_mask;
pub use opcode::Opcode;
pub use writer::ControlWriter;
