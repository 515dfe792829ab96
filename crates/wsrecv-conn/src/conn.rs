use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wsrecv_frame::{CloseFrame, ControlWriter, Opcode, StatusCode};

use crate::config::{ConnConfig, Role};
use crate::control::Pings;
use crate::error::{ConnError, Result};
use crate::reader::{MessageReader, MessageType, ReadState};
use crate::source::{expire, ReadFailure};
use crate::state::{CloseState, PhaseCell, ReadPhase};

pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const DISCARD_CHUNK_SIZE: usize = 4 * 1024;

/// Shared connection state. Reached through [`Conn`] and [`MessageReader`].
pub(crate) struct Inner {
    pub(crate) config: ConnConfig,
    read: Mutex<ReadState>,
    writer: Mutex<ControlWriter<BoxedWriter>>,
    pub(crate) pings: Pings,
    pub(crate) close: CloseState,
    pub(crate) phase: PhaseCell,
    read_limit: AtomicU64,
    read_closed: AtomicBool,
    drain: OnceLock<CancellationToken>,
    ping_counter: AtomicU64,
}

impl Inner {
    pub(crate) fn read_limit(&self) -> u64 {
        self.read_limit.load(Ordering::Relaxed)
    }

    /// Acquire the read path, racing the deadline and connection close.
    pub(crate) async fn lock_read(
        &self,
        deadline: Option<Instant>,
    ) -> Result<MutexGuard<'_, ReadState>> {
        tokio::select! {
            biased;
            _ = self.close.token().cancelled() => Err(self.close.error()),
            _ = expire(deadline) => Err(ConnError::DeadlineExceeded),
            guard = self.read.lock() => Ok(guard),
        }
    }

    /// Translate a failed stream pull into the error the caller sees,
    /// closing the connection for everything but a deadline.
    pub(crate) async fn read_failure(&self, failure: ReadFailure) -> ConnError {
        match failure {
            ReadFailure::Deadline => ConnError::DeadlineExceeded,
            ReadFailure::Closed => self.close.error(),
            ReadFailure::Eof => self.fail(ConnError::ConnectionLost).await,
            ReadFailure::Io(err) => self.fail(ConnError::from(err)).await,
            ReadFailure::Frame(err) => {
                let err = ConnError::Protocol(err.to_string());
                self.fail_with_close(StatusCode::PROTOCOL_ERROR, err).await
            }
        }
    }

    /// Record `err` and tear down without a close frame. Returns the recorded error.
    pub(crate) async fn fail(&self, err: ConnError) -> ConnError {
        let recorded = self.close.record(err);
        self.teardown().await;
        recorded
    }

    /// Record `err`, send a best-effort close frame with `code`, then tear down.
    pub(crate) async fn fail_with_close(&self, code: StatusCode, err: ConnError) -> ConnError {
        if self.close.is_closed() {
            return self.close.error();
        }

        warn!(code = code.0, error = %err, "failing connection");
        let recorded = self.close.record(err.clone());
        let frame = CloseFrame::new(code, err.to_string());
        if let Err(err) = self.send_close(&frame).await {
            debug!(error = %err, "failed to send close frame");
        }
        self.teardown().await;
        recorded
    }

    /// Send one control frame within the control timeout. A failed write closes the connection.
    pub(crate) async fn write_control(&self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        if self.close.is_closed() {
            return Err(self.close.error());
        }

        let written = tokio::time::timeout(self.config.control_timeout, async {
            let mut writer = self.writer.lock().await;
            writer.write_control(opcode, payload).await
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(self.fail(err.into()).await),
            Err(_) => Err(self.fail(ConnError::ControlTimeout).await),
        }
    }

    /// Send a close frame unless one already went out. Does not tear down.
    pub(crate) async fn send_close(&self, frame: &CloseFrame) -> Result<bool> {
        if self.close.is_closed() {
            return Ok(false);
        }

        let written = tokio::time::timeout(self.config.control_timeout, async {
            let mut writer = self.writer.lock().await;
            writer.write_close(frame).await
        })
        .await;

        match written {
            Ok(Ok(sent)) => {
                if sent {
                    trace!(code = frame.code.0, "sent close frame");
                }
                Ok(sent)
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(ConnError::ControlTimeout),
        }
    }

    /// Shut the sink down and wake everything waiting on the connection.
    pub(crate) async fn teardown(&self) {
        if self.close.is_closed() {
            return;
        }

        if let Ok(mut writer) = self.writer.try_lock() {
            match tokio::time::timeout(self.config.control_timeout, writer.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = %err, "failed to shut down stream"),
                Err(_) => debug!("timed out shutting down stream"),
            }
        }

        self.phase.set(ReadPhase::Closed);
        self.close.token().cancel();
        debug!("connection closed");
    }

    /// Keep the read path moving, discarding data, until the peer's close
    /// frame arrives or something else ends the connection.
    async fn await_peer_close(&self, deadline: Instant) -> ConnError {
        let mut state = match self.lock_read(Some(deadline)).await {
            Ok(state) => state,
            Err(err) => return err,
        };
        state.in_message = false;
        state.inflater = None;

        let token = self.close.token();
        let mut scratch = vec![0u8; DISCARD_CHUNK_SIZE];
        loop {
            let wire = &mut state.wire;
            while wire.frame.remaining > 0 {
                let want = usize::try_from(wire.frame.remaining)
                    .map_or(scratch.len(), |remaining| remaining.min(scratch.len()));
                match wire
                    .source
                    .read_payload(&mut scratch[..want], Some(deadline), token)
                    .await
                {
                    Ok(n) => wire.frame.remaining -= n as u64,
                    Err(failure) => return self.read_failure(failure).await,
                }
            }

            match self.next_data_frame(&mut wire.source, Some(deadline)).await {
                Ok(header) => {
                    trace!(opcode = %header.opcode, len = header.payload_len, "discarding data frame while closing");
                    wire.frame.arm(&header);
                }
                Err(err) => return err,
            }
        }
    }
}

/// Receive side of a framed, WebSocket-style connection.
///
/// Cheap to clone; all clones share one connection. Reads are serialized:
/// one [`MessageReader`] at a time, read to completion before the next.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<Inner>,
}

impl Conn {
    /// Wrap a bidirectional stream whose upgrade handshake already happened.
    pub fn new<S>(stream: S, config: ConnConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, config)
    }

    /// Build a connection from separate read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, config: ConnConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let masks = config.role.masks_outgoing();
        let read_limit = config.read_limit;
        debug!(
            role = ?config.role,
            compression = config.compression.is_some(),
            read_limit,
            "connection opened"
        );

        let inner = Inner {
            read: Mutex::new(ReadState::new(Box::new(reader), read_limit)),
            writer: Mutex::new(ControlWriter::new(Box::new(writer) as BoxedWriter, masks)),
            pings: Pings::default(),
            close: CloseState::new(),
            phase: PhaseCell::new(),
            read_limit: AtomicU64::new(read_limit),
            read_closed: AtomicBool::new(false),
            drain: OnceLock::new(),
            ping_counter: AtomicU64::new(0),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Server-side connection with default settings.
    pub fn server<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::new(stream, ConnConfig::new(Role::Server))
    }

    /// Client-side connection with default settings.
    pub fn client<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::new(stream, ConnConfig::new(Role::Client))
    }

    pub fn config(&self) -> &ConnConfig {
        &self.inner.config
    }

    pub fn role(&self) -> Role {
        self.inner.config.role
    }

    /// Change the per-message ceiling. Takes effect at the next message.
    pub fn set_read_limit(&self, limit: u64) {
        self.inner.read_limit.store(limit, Ordering::Relaxed);
    }

    pub fn read_limit(&self) -> u64 {
        self.inner.read_limit()
    }

    pub fn read_phase(&self) -> ReadPhase {
        self.inner.phase.get()
    }

    /// Wait for the next data message and return a reader over its payload.
    ///
    /// Control frames that arrive first are answered inline. The previous
    /// reader must have returned `Ok(0)`; otherwise the connection is closed
    /// with a protocol error.
    pub async fn reader(&self, deadline: Option<Instant>) -> Result<(MessageType, MessageReader)> {
        if self.inner.read_closed.load(Ordering::Acquire) {
            return Err(ConnError::ReadClosed);
        }
        if self.inner.close.is_closed() {
            return Err(self.inner.close.error());
        }
        self.inner.next_message(deadline).await
    }

    /// Read one whole message.
    pub async fn read(&self, deadline: Option<Instant>) -> Result<(MessageType, Bytes)> {
        let (kind, reader) = self.reader(deadline).await?;
        let payload = reader.into_bytes().await?;
        Ok((kind, payload))
    }

    /// Send a ping and wait for its pong.
    ///
    /// Pongs are only seen while something reads the connection, either the
    /// application or the drain task started by [`close_read`](Self::close_read).
    pub async fn ping(&self, deadline: Option<Instant>) -> Result<()> {
        let inner = &self.inner;
        if inner.close.is_closed() {
            return Err(inner.close.error());
        }

        let id = inner.ping_counter.fetch_add(1, Ordering::Relaxed);
        let token = Bytes::from(id.to_string());
        let (pong, _registration) = inner.pings.register(token.clone());
        inner.write_control(Opcode::Ping, &token).await?;
        trace!(id, "sent ping");

        tokio::select! {
            biased;
            answered = pong => answered.map_err(|_| inner.close.error()),
            _ = inner.close.token().cancelled() => Err(inner.close.error()),
            _ = expire(deadline) => Err(ConnError::DeadlineExceeded),
        }
    }

    /// Close the connection with a close handshake.
    ///
    /// Sends a close frame, then keeps reading (discarding data messages)
    /// until the peer's close frame arrives or the deadline passes. Without a
    /// deadline the configured close timeout applies. Returns `Ok(())` when
    /// the peer answered.
    pub async fn close(
        &self,
        code: StatusCode,
        reason: &str,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let inner = &self.inner;
        if inner.close.is_closed() {
            return Err(inner.close.error());
        }

        let deadline = deadline.unwrap_or_else(|| Instant::now() + inner.config.close_timeout);
        let frame = CloseFrame::new(code, reason);
        debug!(code = code.0, reason, "closing connection");
        inner.close.record(ConnError::ClosedLocally(frame.clone()));

        if let Err(err) = inner.send_close(&frame).await {
            return Err(inner.fail(err).await);
        }

        let outcome = inner.await_peer_close(deadline).await;
        inner.teardown().await;
        match inner.close.peer_close() {
            Some(peer) => {
                trace!(code = peer.code.0, "close handshake complete");
                Ok(())
            }
            None => Err(outcome),
        }
    }

    /// Hand the read side to a background task that services control frames
    /// and closes with a policy violation if a data message arrives.
    ///
    /// Later calls to [`reader`](Self::reader) and [`read`](Self::read) return
    /// [`ConnError::ReadClosed`]. The returned token is cancelled when the
    /// task exits. Must be called within a tokio runtime.
    pub fn close_read(&self) -> CancellationToken {
        self.inner
            .drain
            .get_or_init(|| {
                self.inner.read_closed.store(true, Ordering::Release);
                let done = CancellationToken::new();
                let guard = done.clone().drop_guard();
                let conn = self.clone();
                tokio::spawn(async move {
                    let _done = guard;
                    conn.drain().await;
                });
                done
            })
            .clone()
    }

    async fn drain(&self) {
        debug!("drain task started");
        match self.inner.next_message(None).await {
            Ok((kind, _reader)) => {
                warn!(%kind, "received data message while draining");
                if let Err(err) = self
                    .close(StatusCode::POLICY_VIOLATION, "unexpected data message", None)
                    .await
                {
                    debug!(error = %err, "close after unexpected data message did not complete");
                }
            }
            Err(err) => debug!(error = %err, "drain task stopped"),
        }
    }

    /// Tear the connection down without a close frame.
    pub async fn abort(&self) {
        let frame = CloseFrame::new(StatusCode::ABNORMAL_CLOSURE, "connection aborted");
        self.inner.fail(ConnError::ClosedLocally(frame)).await;
    }

    /// The recorded close error, once the connection has failed or closed.
    pub fn close_error(&self) -> Option<ConnError> {
        self.inner.close.get()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.close.is_closed()
    }

    /// Token cancelled when the connection is torn down.
    pub fn closed(&self) -> CancellationToken {
        self.inner.close.token().child_token()
    }

    /// Number of pings still waiting for a pong.
    pub fn outstanding_pings(&self) -> usize {
        self.inner.pings.len()
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("role", &self.inner.config.role)
            .field("phase", &self.inner.phase.get())
            .field("closed", &self.inner.close.is_closed())
            .finish()
    }
}
