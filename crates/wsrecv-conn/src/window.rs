/// Size of the deflate history window.
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Bounded history of decompressed bytes, used to prime the inflater of the
/// next message when the peer keeps its compression context.
#[derive(Debug, Clone)]
pub(crate) struct SlidingWindow {
    buf: Vec<u8>,
    cap: usize,
}

impl SlidingWindow {
    pub(crate) fn new() -> Self {
        Self::with_capacity(WINDOW_SIZE)
    }

    pub(crate) fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
        }
    }

    /// Append `data`, keeping only the most recent `cap` bytes.
    pub(crate) fn write(&mut self, data: &[u8]) {
        if data.len() >= self.cap {
            self.buf.clear();
            self.buf.extend_from_slice(&data[data.len() - self.cap..]);
            return;
        }

        let overflow = (self.buf.len() + data.len()).saturating_sub(self.cap);
        if overflow > 0 {
            self.buf.drain(..overflow);
        }
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }
}
