use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::opcode::Opcode;

/// Largest possible header: 2 fixed + 8 extended length + 4 mask key.
pub const MAX_HEADER_SIZE: usize = 14;

/// Control frames may carry at most this many payload bytes.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0b1000_0000;
const RSV1_BIT: u8 = 0b0100_0000;
const RSV2_BIT: u8 = 0b0010_0000;
const RSV3_BIT: u8 = 0b0001_0000;
const MASK_BIT: u8 = 0b1000_0000;
const LENGTH_MASK: u8 = 0b0111_1111;

const LENGTH_U16: u8 = 126;
const LENGTH_U64: u8 = 127;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Last fragment of a message.
    pub fin: bool,
    /// Per-message compression marker.
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: Opcode,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// Mask key, present iff the mask bit was set.
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// A final, unmasked header with no reserved bits set.
    pub fn new(opcode: Opcode, payload_len: u64) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload_len,
            mask: None,
        }
    }

    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        let length = match self.payload_len {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + length + mask
    }
}

/// Decode a frame header from the front of `src` without consuming it.
///
/// Returns `Ok(None)` if `src` doesn't contain a complete header yet.
/// On success returns the header and the number of bytes it occupies.
///
/// Wire format:
/// ```text
/// ┌─────┬──────┬──────┬──────┬────────┬──────┬─────────────┬─────────────┐
/// │ FIN │ RSV1 │ RSV2 │ RSV3 │ opcode │ MASK │ length (7b) │ ext. length │
/// │ 1b  │ 1b   │ 1b   │ 1b   │ 4b     │ 1b   │ 126 → 16b   │ 0/2/8 bytes │
/// │     │      │      │      │        │      │ 127 → 64b   │ mask key 0/4│
/// └─────┴──────┴──────┴──────┴────────┴──────┴─────────────┴─────────────┘
/// ```
pub fn decode_header(src: &[u8]) -> Result<Option<(FrameHeader, usize)>> {
    if src.len() < 2 {
        return Ok(None);
    }

    let first = src[0];
    let second = src[1];
    let masked = second & MASK_BIT == MASK_BIT;

    let (payload_len, mut offset) = match second & LENGTH_MASK {
        LENGTH_U16 => {
            let Some(bytes) = src.get(2..4) else {
                return Ok(None);
            };
            (u16::from_be_bytes([bytes[0], bytes[1]]) as u64, 4)
        }
        LENGTH_U64 => {
            let Some(bytes) = src.get(2..10) else {
                return Ok(None);
            };
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            let len = u64::from_be_bytes(buf);
            if len & (1 << 63) != 0 {
                return Err(FrameError::InvalidLength(len));
            }
            (len, 10)
        }
        small => (small as u64, 2),
    };

    let mask = if masked {
        let Some(bytes) = src.get(offset..offset + 4) else {
            return Ok(None);
        };
        offset += 4;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    } else {
        None
    };

    let header = FrameHeader {
        fin: first & FIN_BIT == FIN_BIT,
        rsv1: first & RSV1_BIT == RSV1_BIT,
        rsv2: first & RSV2_BIT == RSV2_BIT,
        rsv3: first & RSV3_BIT == RSV3_BIT,
        opcode: Opcode::from_u8(first),
        payload_len,
        mask,
    };

    Ok(Some((header, offset)))
}

/// Encode a frame header into `dst` using the shortest length form.
pub fn encode_header(header: &FrameHeader, dst: &mut BytesMut) {
    dst.reserve(header.encoded_len());

    let mut first = header.opcode.as_u8();
    if header.fin {
        first |= FIN_BIT;
    }
    if header.rsv1 {
        first |= RSV1_BIT;
    }
    if header.rsv2 {
        first |= RSV2_BIT;
    }
    if header.rsv3 {
        first |= RSV3_BIT;
    }
    dst.put_u8(first);

    let mask_bit = if header.mask.is_some() { MASK_BIT } else { 0 };
    match header.payload_len {
        len @ 0..=125 => dst.put_u8(mask_bit | len as u8),
        len @ 126..=0xFFFF => {
            dst.put_u8(mask_bit | LENGTH_U16);
            dst.put_u16(len as u16);
        }
        len => {
            dst.put_u8(mask_bit | LENGTH_U64);
            dst.put_u64(len);
        }
    }

    if let Some(key) = header.mask {
        dst.put_slice(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(header: &FrameHeader) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_header(header, &mut buf);
        buf
    }

    #[test]
    fn decode_rfc_masked_text() {
        let wire = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let (header, size) = decode_header(&wire).unwrap().unwrap();

        assert!(header.fin);
        assert_eq!(header.opcode, Opcode::Text);
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(size, 6);
    }

    #[test]
    fn decode_unfinished_fragment() {
        let wire = [0x01, 0x03, b'H', b'e', b'l'];
        let (header, size) = decode_header(&wire).unwrap().unwrap();
        assert!(!header.fin);
        assert_eq!(header.opcode, Opcode::Text);
        assert_eq!(header.mask, None);
        assert_eq!(size, 2);
    }

    #[test]
    fn decode_reserved_bits() {
        let wire = [0x80 | 0x40 | 0x20 | 0x10 | 0x2, 0x00];
        let (header, _) = decode_header(&wire).unwrap().unwrap();
        assert!(header.rsv1 && header.rsv2 && header.rsv3);
        assert_eq!(header.opcode, Opcode::Binary);
    }

    #[test]
    fn decode_needs_more_bytes() {
        assert!(decode_header(&[]).unwrap().is_none());
        assert!(decode_header(&[0x82]).unwrap().is_none());
        assert!(decode_header(&[0x82, 126, 0x01]).unwrap().is_none());
        assert!(decode_header(&[0x82, 127, 0, 0, 0, 0]).unwrap().is_none());
        assert!(decode_header(&[0x82, 0x80 | 4, 1, 2, 3]).unwrap().is_none());
    }

    #[test]
    fn decode_extended_lengths() {
        let (h16, size16) = decode_header(&[0x82, 126, 0x01, 0x00]).unwrap().unwrap();
        assert_eq!(h16.payload_len, 256);
        assert_eq!(size16, 4);

        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&70_000u64.to_be_bytes());
        let (h64, size64) = decode_header(&wire).unwrap().unwrap();
        assert_eq!(h64.payload_len, 70_000);
        assert_eq!(size64, 10);
    }

    #[test]
    fn decode_rejects_msb_length() {
        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&(1u64 << 63).to_be_bytes());
        let err = decode_header(&wire).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength(_)));
    }

    #[test]
    fn encode_uses_shortest_length_form() {
        assert_eq!(encoded(&FrameHeader::new(Opcode::Text, 125)).len(), 2);
        assert_eq!(encoded(&FrameHeader::new(Opcode::Text, 126)).len(), 4);
        assert_eq!(encoded(&FrameHeader::new(Opcode::Text, 65_535)).len(), 4);
        assert_eq!(encoded(&FrameHeader::new(Opcode::Text, 65_536)).len(), 10);
    }

    #[test]
    fn encode_then_decode_masked_ping() {
        let header = FrameHeader {
            mask: Some([1, 2, 3, 4]),
            ..FrameHeader::new(Opcode::Ping, 9)
        };
        let buf = encoded(&header);
        assert_eq!(buf.len(), header.encoded_len());

        let (decoded, size) = decode_header(&buf).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert_eq!(size, 6);
    }
}
