use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wsrecv_frame::{decode_header, FrameError, FrameHeader};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_RESERVE: usize = 8 * 1024;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Why a pull from the byte stream did not produce data.
#[derive(Debug)]
pub(crate) enum ReadFailure {
    /// The caller's deadline (or an internal one) elapsed.
    Deadline,
    /// The connection was torn down while waiting.
    Closed,
    Io(std::io::Error),
    /// The stream ended.
    Eof,
    /// The bytes do not form a valid frame header.
    Frame(FrameError),
}

/// Resolves at `deadline`, or never.
pub(crate) async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Buffered, cancel-safe pull side of the byte stream.
///
/// Every suspension point races the stream against a deadline and the
/// connection's close token. Bytes are only removed from the buffer once a
/// caller has everything it needs, so an abandoned call leaves nothing
/// half-consumed.
pub(crate) struct FrameSource {
    inner: BoxedReader,
    buf: BytesMut,
}

impl FrameSource {
    pub(crate) fn new(inner: BoxedReader) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read more bytes from the stream into the buffer.
    async fn fill(
        &mut self,
        deadline: Option<Instant>,
        closed: &CancellationToken,
    ) -> Result<(), ReadFailure> {
        self.buf.reserve(READ_RESERVE);
        let read = tokio::select! {
            biased;
            _ = closed.cancelled() => return Err(ReadFailure::Closed),
            _ = expire(deadline) => return Err(ReadFailure::Deadline),
            read = self.inner.read_buf(&mut self.buf) => read.map_err(ReadFailure::Io)?,
        };
        if read == 0 {
            return Err(ReadFailure::Eof);
        }
        Ok(())
    }

    /// Wait for a complete header at the front of the buffer without consuming it.
    pub(crate) async fn peek_header(
        &mut self,
        deadline: Option<Instant>,
        closed: &CancellationToken,
    ) -> Result<(FrameHeader, usize), ReadFailure> {
        loop {
            if let Some(decoded) = decode_header(&self.buf).map_err(ReadFailure::Frame)? {
                return Ok(decoded);
            }
            self.fill(deadline, closed).await?;
        }
    }

    /// Wait until at least `n` bytes are buffered.
    pub(crate) async fn fill_to(
        &mut self,
        n: usize,
        deadline: Option<Instant>,
        closed: &CancellationToken,
    ) -> Result<(), ReadFailure> {
        while self.buf.len() < n {
            self.fill(deadline, closed).await?;
        }
        Ok(())
    }

    /// Drop `n` buffered bytes.
    pub(crate) fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Split off the first `n` buffered bytes.
    pub(crate) fn take(&mut self, n: usize) -> BytesMut {
        self.buf.split_to(n)
    }

    /// Copy up to `dst.len()` payload bytes, reading from the stream only
    /// when nothing is buffered.
    pub(crate) async fn read_payload(
        &mut self,
        dst: &mut [u8],
        deadline: Option<Instant>,
        closed: &CancellationToken,
    ) -> Result<usize, ReadFailure> {
        if dst.is_empty() {
            return Ok(0);
        }
        if self.buf.is_empty() {
            self.fill(deadline, closed).await?;
        }
        let n = dst.len().min(self.buf.len());
        dst[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.buf.len()
    }
}
