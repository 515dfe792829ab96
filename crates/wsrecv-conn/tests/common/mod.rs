#![allow(dead_code)]

use std::time::Duration;

use bytes::{Buf, BytesMut};
use flate2::{Compress, FlushCompress};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use wsrecv_conn::{Conn, ConnConfig, DEFLATE_TAIL};
use wsrecv_frame::{apply_mask, decode_header, encode_header, CloseFrame, FrameHeader, Opcode};

pub const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// A frame to put on the wire from the peer's side.
#[derive(Clone)]
pub struct FrameSpec {
    header: FrameHeader,
    payload: Vec<u8>,
}

pub fn frame(opcode: Opcode, payload: &[u8]) -> FrameSpec {
    FrameSpec {
        header: FrameHeader::new(opcode, payload.len() as u64),
        payload: payload.to_vec(),
    }
}

pub fn close_frame(frame: &CloseFrame) -> FrameSpec {
    self::frame(Opcode::Close, &frame.encode())
}

impl FrameSpec {
    pub fn fin(mut self, fin: bool) -> Self {
        self.header.fin = fin;
        self
    }

    pub fn rsv1(mut self) -> Self {
        self.header.rsv1 = true;
        self
    }

    pub fn rsv2(mut self) -> Self {
        self.header.rsv2 = true;
        self
    }

    pub fn masked(mut self) -> Self {
        self.header.mask = Some(KEY);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut wire = BytesMut::new();
        encode_header(&self.header, &mut wire);
        let start = wire.len();
        wire.extend_from_slice(&self.payload);
        if let Some(key) = self.header.mask {
            apply_mask(key, 0, &mut wire[start..]);
        }
        wire.to_vec()
    }
}

/// The far end of a connection under test.
pub struct Peer {
    stream: DuplexStream,
    buf: BytesMut,
}

pub fn pair(config: ConnConfig) -> (Conn, Peer) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let conn = Conn::new(local, config);
    let peer = Peer {
        stream: remote,
        buf: BytesMut::new(),
    };
    (conn, peer)
}

impl Peer {
    pub async fn send(&mut self, frames: &[FrameSpec]) {
        for frame in frames {
            self.stream.write_all(&frame.encode()).await.unwrap();
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Half-close the peer's write side.
    pub async fn finish(&mut self) {
        self.stream.shutdown().await.unwrap();
    }

    /// Next frame written by the connection, unmasked. `None` at end of stream.
    pub async fn next_frame(&mut self) -> Option<(FrameHeader, Vec<u8>)> {
        tokio::time::timeout(PEER_TIMEOUT, self.read_frame())
            .await
            .expect("connection did not write a frame or close the stream")
    }

    async fn read_frame(&mut self) -> Option<(FrameHeader, Vec<u8>)> {
        loop {
            if let Some((header, size)) = decode_header(&self.buf).unwrap() {
                let total = size + header.payload_len as usize;
                if self.buf.len() >= total {
                    self.buf.advance(size);
                    let mut payload = self.buf.split_to(total - size).to_vec();
                    if let Some(key) = header.mask {
                        apply_mask(key, 0, &mut payload);
                    }
                    return Some((header, payload));
                }
            }

            let mut chunk = [0u8; 512];
            let n = self.stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                assert!(self.buf.is_empty(), "stream ended inside a frame");
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn expect_close(&mut self) -> CloseFrame {
        let (header, payload) = self.next_frame().await.expect("expected a close frame");
        assert_eq!(header.opcode, Opcode::Close);
        CloseFrame::parse(&payload).unwrap()
    }

    pub async fn expect_eof(&mut self) {
        assert!(self.next_frame().await.is_none(), "expected end of stream");
    }
}

/// Compress one message as a peer does: sync flush, tail removed.
pub fn deflate(compress: &mut Compress, plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plain.len() + 64);
    compress
        .compress_vec(plain, &mut out, FlushCompress::Sync)
        .unwrap();
    assert!(out.ends_with(&DEFLATE_TAIL));
    out.truncate(out.len() - DEFLATE_TAIL.len());
    out
}
