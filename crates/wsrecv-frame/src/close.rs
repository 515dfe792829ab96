//! Close status codes and close frame payloads.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::MAX_CONTROL_PAYLOAD;

/// Close reasons share the control payload budget with the 2-byte code.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

/// A close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const NORMAL_CLOSURE: Self = Self(1000);
    pub const GOING_AWAY: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    // 1004 is reserved.
    /// Never sent on the wire; stands in for an empty close payload.
    pub const NO_STATUS_RCVD: Self = Self(1005);
    /// Never sent on the wire; the connection dropped without a close frame.
    pub const ABNORMAL_CLOSURE: Self = Self(1006);
    pub const INVALID_FRAME_PAYLOAD_DATA: Self = Self(1007);
    pub const POLICY_VIOLATION: Self = Self(1008);
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    pub const MANDATORY_EXTENSION: Self = Self(1010);
    pub const INTERNAL_ERROR: Self = Self(1011);
    pub const SERVICE_RESTART: Self = Self(1012);
    pub const TRY_AGAIN_LATER: Self = Self(1013);
    pub const BAD_GATEWAY: Self = Self(1014);
    /// Never sent on the wire.
    pub const TLS_HANDSHAKE: Self = Self(1015);

    /// Whether a peer may legally send this code in a close frame.
    pub fn is_valid_on_wire(self) -> bool {
        match self.0 {
            1004..=1006 => false,
            1000..=1014 => true,
            3000..=4999 => true,
            _ => false,
        }
    }

    /// Symbolic name for known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::NORMAL_CLOSURE => "NormalClosure",
            Self::GOING_AWAY => "GoingAway",
            Self::PROTOCOL_ERROR => "ProtocolError",
            Self::UNSUPPORTED_DATA => "UnsupportedData",
            Self::NO_STATUS_RCVD => "NoStatusRcvd",
            Self::ABNORMAL_CLOSURE => "AbnormalClosure",
            Self::INVALID_FRAME_PAYLOAD_DATA => "InvalidFramePayloadData",
            Self::POLICY_VIOLATION => "PolicyViolation",
            Self::MESSAGE_TOO_BIG => "MessageTooBig",
            Self::MANDATORY_EXTENSION => "MandatoryExtension",
            Self::INTERNAL_ERROR => "InternalError",
            Self::SERVICE_RESTART => "ServiceRestart",
            Self::TRY_AGAIN_LATER => "TryAgainLater",
            Self::BAD_GATEWAY => "BadGateway",
            Self::TLS_HANDSHAKE => "TLSHandshake",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "StatusCode({})", self.0),
        }
    }
}

impl From<u16> for StatusCode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// A close frame payload: status code plus UTF-8 reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: StatusCode,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Parse a received close payload.
    ///
    /// An empty payload means the peer sent no status and yields
    /// [`StatusCode::NO_STATUS_RCVD`].
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Ok(Self::new(StatusCode::NO_STATUS_RCVD, String::new()));
        }
        if payload.len() < 2 {
            return Err(FrameError::InvalidClosePayload(format!(
                "payload of {} byte cannot contain a status code",
                payload.len()
            )));
        }

        let code = StatusCode(u16::from_be_bytes([payload[0], payload[1]]));
        if !code.is_valid_on_wire() {
            return Err(FrameError::InvalidClosePayload(format!(
                "invalid status code {}",
                code.0
            )));
        }

        let reason = std::str::from_utf8(&payload[2..])
            .map_err(|err| FrameError::InvalidClosePayload(format!("reason is not UTF-8: {err}")))?;

        Ok(Self::new(code, reason))
    }

    /// Encode as a close payload.
    ///
    /// [`StatusCode::NO_STATUS_RCVD`] encodes as an empty payload. Reasons
    /// longer than [`MAX_CLOSE_REASON`] are cut at a char boundary.
    pub fn encode(&self) -> Bytes {
        if self.code == StatusCode::NO_STATUS_RCVD {
            return Bytes::new();
        }

        let reason = truncate_reason(&self.reason);
        let mut buf = BytesMut::with_capacity(2 + reason.len());
        buf.put_u16(self.code.0);
        buf.put_slice(reason.as_bytes());
        buf.freeze()
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status = {} and reason = {:?}", self.code, self.reason)
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_code_and_reason() {
        let payload = [0x03, 0xE8, b'b', b'y', b'e'];
        let frame = CloseFrame::parse(&payload).unwrap();
        assert_eq!(frame.code, StatusCode::NORMAL_CLOSURE);
        assert_eq!(frame.reason, "bye");
    }

    #[test]
    fn parse_empty_payload() {
        let frame = CloseFrame::parse(&[]).unwrap();
        assert_eq!(frame.code, StatusCode::NO_STATUS_RCVD);
        assert!(frame.reason.is_empty());
    }

    #[test]
    fn parse_rejects_single_byte() {
        let err = CloseFrame::parse(&[0x03]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidClosePayload(_)));
    }

    #[test]
    fn parse_rejects_reserved_codes() {
        for code in [999u16, 1004, 1005, 1006, 1015, 2999, 5000] {
            let payload = code.to_be_bytes();
            assert!(
                CloseFrame::parse(&payload).is_err(),
                "code {code} should be rejected"
            );
        }
    }

    #[test]
    fn parse_accepts_application_codes() {
        let frame = CloseFrame::parse(&4000u16.to_be_bytes()).unwrap();
        assert_eq!(frame.code, StatusCode(4000));
        assert!(frame.code.name().is_none());
    }

    #[test]
    fn parse_rejects_invalid_utf8_reason() {
        let payload = [0x03, 0xE8, 0xff, 0xfe];
        assert!(CloseFrame::parse(&payload).is_err());
    }

    #[test]
    fn encode_no_status_is_empty() {
        let frame = CloseFrame::new(StatusCode::NO_STATUS_RCVD, "ignored");
        assert!(frame.encode().is_empty());
    }

    #[test]
    fn encode_truncates_long_reason_on_char_boundary() {
        let reason = "é".repeat(100);
        let payload = CloseFrame::new(StatusCode::GOING_AWAY, reason).encode();
        assert!(payload.len() <= MAX_CONTROL_PAYLOAD);

        let parsed = CloseFrame::parse(&payload).unwrap();
        assert_eq!(parsed.code, StatusCode::GOING_AWAY);
        assert_eq!(parsed.reason.chars().count(), 61);
    }

    #[test]
    fn display_includes_name() {
        let frame = CloseFrame::new(StatusCode::MESSAGE_TOO_BIG, "limit");
        assert_eq!(
            frame.to_string(),
            "status = MessageTooBig(1009) and reason = \"limit\""
        );
    }
}
