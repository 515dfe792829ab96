use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::close::CloseFrame;
use crate::error::{FrameError, Result};
use crate::header::{encode_header, FrameHeader, MAX_CONTROL_PAYLOAD, MAX_HEADER_SIZE};
use crate::mask::apply_mask;
use crate::opcode::Opcode;

/// Writes control frames (ping, pong, close) to any `AsyncWrite` sink.
///
/// This is the only emission path the receive side needs: answering pings,
/// echoing close frames and reporting protocol errors.
pub struct ControlWriter<W> {
    inner: W,
    buf: BytesMut,
    mask_frames: bool,
    wrote_close: bool,
}

impl<W: AsyncWrite + Unpin> ControlWriter<W> {
    /// Create a control writer. Client-side writers must set `mask_frames`.
    pub fn new(inner: W, mask_frames: bool) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_HEADER_SIZE + MAX_CONTROL_PAYLOAD),
            mask_frames,
            wrote_close: false,
        }
    }

    /// Encode and send a single, final control frame.
    pub async fn write_control(&mut self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        if !opcode.is_control() {
            return Err(FrameError::NotControl(opcode));
        }
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(FrameError::ControlTooLarge {
                size: payload.len(),
                max: MAX_CONTROL_PAYLOAD,
            });
        }

        let header = FrameHeader {
            mask: self.mask_frames.then(rand::random::<[u8; 4]>),
            ..FrameHeader::new(opcode, payload.len() as u64)
        };

        self.buf.clear();
        encode_header(&header, &mut self.buf);
        let start = self.buf.len();
        self.buf.extend_from_slice(payload);
        if let Some(key) = header.mask {
            apply_mask(key, 0, &mut self.buf[start..]);
        }

        trace!(%opcode, len = payload.len(), "writing control frame");
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Send a close frame unless one was already sent.
    ///
    /// Returns `Ok(false)` without writing when a close frame went out earlier.
    pub async fn write_close(&mut self, frame: &CloseFrame) -> Result<bool> {
        if self.wrote_close {
            return Ok(false);
        }
        self.wrote_close = true;
        self.write_control(Opcode::Close, &frame.encode()).await?;
        Ok(true)
    }

    /// Whether a close frame has been written.
    pub fn wrote_close(&self) -> bool {
        self.wrote_close
    }

    /// Shut down the underlying sink.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
