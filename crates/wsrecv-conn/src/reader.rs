use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use wsrecv_frame::{apply_mask, FrameHeader, Opcode, StatusCode};

use crate::conn::Inner;
use crate::error::{ConnError, Result};
use crate::inflate::{Inflated, Inflater};
use crate::limit::LimitGuard;
use crate::source::{BoxedReader, FrameSource};
use crate::state::ReadPhase;
use crate::window::SlidingWindow;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Type of a received message, taken from its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Binary,
}

impl MessageType {
    fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Text => Some(Self::Text),
            Opcode::Binary => Some(Self::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// Position inside the data frame currently being read.
#[derive(Debug, Default)]
pub(crate) struct FrameCursor {
    pub(crate) remaining: u64,
    mask: Option<[u8; 4]>,
    mask_pos: usize,
    fin: bool,
}

impl FrameCursor {
    pub(crate) fn arm(&mut self, header: &FrameHeader) {
        self.remaining = header.payload_len;
        self.mask = header.mask;
        self.mask_pos = 0;
        self.fin = header.fin;
    }
}

/// Raw frame-payload pull plus its byte budget.
pub(crate) struct WireState {
    pub(crate) source: FrameSource,
    pub(crate) frame: FrameCursor,
    limit: LimitGuard,
}

/// Everything the read path mutates, guarded by the read lock.
pub(crate) struct ReadState {
    pub(crate) wire: WireState,
    pub(crate) inflater: Option<Inflater>,
    window: SlidingWindow,
    /// Budget for decompressed bytes handed to the caller.
    inflated: LimitGuard,
    pub(crate) in_message: bool,
    seq: u64,
}

impl ReadState {
    pub(crate) fn new(reader: BoxedReader, read_limit: u64) -> Self {
        Self {
            wire: WireState {
                source: FrameSource::new(reader),
                frame: FrameCursor::default(),
                limit: LimitGuard::new(read_limit),
            },
            inflater: None,
            window: SlidingWindow::new(),
            inflated: LimitGuard::new(read_limit),
            in_message: false,
            seq: 0,
        }
    }
}

/// Streaming reader over one message's payload.
///
/// Each call to [`read`](Self::read) takes the connection's read lock, so
/// control frames arriving between fragments are serviced in between.
/// The reader must be read to its end (`Ok(0)`) before the next message
/// is requested.
pub struct MessageReader {
    inner: Arc<Inner>,
    kind: MessageType,
    seq: u64,
    deadline: Option<Instant>,
    done: bool,
}

impl MessageReader {
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Whether end-of-message was reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Deadline applied to every later [`read`](Self::read).
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Read the next chunk of the message. `Ok(0)` marks end-of-message.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        let inner = Arc::clone(&self.inner);
        let mut state = inner.lock_read(self.deadline).await?;
        if !state.in_message || state.seq != self.seq {
            self.done = true;
            return Err(inner.close.error());
        }

        match inner.read_chunk(&mut state, buf, self.deadline).await {
            Ok(0) => {
                state.in_message = false;
                state.inflater = None;
                self.done = true;
                inner.phase.set(ReadPhase::Idle);
                trace!(kind = %self.kind, "end of message");
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(err) if !err.is_fatal() => Err(err),
            Err(err) => {
                inner.fail(err.clone()).await;
                Err(err)
            }
        }
    }

    /// Read the rest of the message into `dst`. Returns the number of bytes appended.
    pub async fn read_to_end(&mut self, dst: &mut BytesMut) -> Result<usize> {
        let start = dst.len();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(dst.len() - start);
            }
            dst.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read the rest of the message into a single buffer.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.read_to_end(&mut dst).await?;
        Ok(dst.freeze())
    }
}

impl fmt::Debug for MessageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReader")
            .field("kind", &self.kind)
            .field("seq", &self.seq)
            .field("done", &self.done)
            .finish()
    }
}

impl Inner {
    /// Wait for the next data message and arm a reader for it.
    pub(crate) async fn next_message(
        self: &Arc<Self>,
        deadline: Option<Instant>,
    ) -> Result<(MessageType, MessageReader)> {
        let mut state = self.lock_read(deadline).await?;
        if state.in_message {
            let err = ConnError::Protocol("previous message not read to completion".to_string());
            return Err(self.fail(err).await);
        }

        self.phase.set(ReadPhase::AwaitingFrame);
        let header = match self.next_data_frame(&mut state.wire.source, deadline).await {
            Ok(header) => header,
            Err(err) => {
                if !err.is_fatal() {
                    self.phase.set(ReadPhase::Idle);
                }
                return Err(err);
            }
        };

        let Some(kind) = MessageType::from_opcode(header.opcode) else {
            let err = ConnError::Protocol(
                "received continuation frame without text or binary frame".to_string(),
            );
            return Err(self.fail_with_close(StatusCode::PROTOCOL_ERROR, err).await);
        };

        self.begin_message(&mut state, &header).await?;
        self.phase.set(ReadPhase::InMessage);
        debug!(
            %kind,
            len = header.payload_len,
            fin = header.fin,
            compressed = header.rsv1,
            "message started"
        );

        let reader = MessageReader {
            inner: Arc::clone(self),
            kind,
            seq: state.seq,
            deadline,
            done: false,
        };
        Ok((kind, reader))
    }

    /// Reset per-message state for the message that `header` starts.
    async fn begin_message(&self, state: &mut ReadState, header: &FrameHeader) -> Result<()> {
        state.seq += 1;
        state.in_message = true;
        let limit = self.read_limit();
        state.wire.limit.reset(limit);
        state.inflated.reset(limit);
        state.wire.frame.arm(header);
        state.inflater = None;

        if header.rsv1 {
            if !self.config.read_context_takeover() {
                state.window.clear();
            }
            match Inflater::new(state.window.as_slice()) {
                Ok(inflater) => state.inflater = Some(inflater),
                Err(err) => return Err(self.fail(err).await),
            }
        }
        Ok(())
    }

    /// One pull through the message pipeline: output budget over inflate
    /// (if compressed) over the wire budget over the raw payload.
    pub(crate) async fn read_chunk(
        &self,
        state: &mut ReadState,
        out: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let takeover = self.config.read_context_takeover();
        let ReadState {
            wire,
            inflater,
            window,
            inflated,
            ..
        } = state;

        let Some(inflater) = inflater.as_mut() else {
            return self.limited_read(wire, out, deadline).await;
        };
        let Some(allowed) = inflated.allowance(out.len()) else {
            return Err(self.read_limited(inflated.ceiling()).await);
        };
        let out = &mut out[..allowed];

        loop {
            match inflater.inflate(out)? {
                Inflated::Data(n) => {
                    inflated.consume(n);
                    if takeover {
                        window.write(&out[..n]);
                    }
                    return Ok(n);
                }
                Inflated::End => {
                    // A final deflate block can end the stream before the frames do.
                    while self
                        .limited_read(wire, &mut inflater.scratch, deadline)
                        .await?
                        > 0
                    {}
                    return Ok(0);
                }
                Inflated::NeedInput => {
                    let n = self
                        .limited_read(wire, &mut inflater.scratch, deadline)
                        .await?;
                    if n == 0 {
                        inflater.finish();
                    } else {
                        inflater.feed(n);
                    }
                }
            }
        }
    }

    /// Raw payload pull under the per-message byte budget.
    async fn limited_read(
        &self,
        wire: &mut WireState,
        out: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let Some(allowed) = wire.limit.allowance(out.len()) else {
            return Err(self.read_limited(wire.limit.ceiling()).await);
        };

        let n = self.raw_read(wire, &mut out[..allowed], deadline).await?;
        wire.limit.consume(n);
        Ok(n)
    }

    async fn read_limited(&self, limit: u64) -> ConnError {
        warn!(limit, "message exceeded read limit");
        let err = ConnError::ReadLimited { limit };
        self.fail_with_close(StatusCode::MESSAGE_TOO_BIG, err).await
    }

    /// Pull unmasked payload bytes, crossing into continuation frames as needed.
    /// `Ok(0)` means the final frame is exhausted.
    async fn raw_read(
        &self,
        wire: &mut WireState,
        out: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while wire.frame.remaining == 0 {
            if wire.frame.fin {
                return Ok(0);
            }
            let header = self.next_data_frame(&mut wire.source, deadline).await?;
            if header.opcode != Opcode::Continuation {
                let err = ConnError::Protocol(
                    "received new data message without finishing the previous message"
                        .to_string(),
                );
                return Err(self.fail_with_close(StatusCode::PROTOCOL_ERROR, err).await);
            }
            wire.frame.arm(&header);
        }

        let want = usize::try_from(wire.frame.remaining)
            .map_or(out.len(), |remaining| remaining.min(out.len()));
        let n = match wire
            .source
            .read_payload(&mut out[..want], deadline, self.close.token())
            .await
        {
            Ok(n) => n,
            Err(failure) => return Err(self.read_failure(failure).await),
        };

        wire.frame.remaining -= n as u64;
        if let Some(key) = wire.frame.mask {
            wire.frame.mask_pos = apply_mask(key, wire.frame.mask_pos, &mut out[..n]);
        }
        Ok(n)
    }
}
