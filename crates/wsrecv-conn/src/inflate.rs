use bytes::{Buf, BytesMut};
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{ConnError, Result};

/// Appended to every compressed message before the final flush.
pub const DEFLATE_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Bytes pulled from the wire per refill of the compressed input.
const INPUT_CHUNK: usize = 4 * 1024;

/// Largest payload of one stored deflate block.
const MAX_STORED_BLOCK: usize = 0xFFFF;

/// Outcome of one inflate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Inflated {
    /// `n` plaintext bytes were written to the output.
    Data(usize),
    /// The compressed stream is exhausted and fully flushed.
    End,
    /// More compressed input is needed before any progress is possible.
    NeedInput,
}

/// Streaming raw-deflate decoder for one message.
pub(crate) struct Inflater {
    decompress: Decompress,
    input: BytesMut,
    pub(crate) scratch: Vec<u8>,
    source_done: bool,
}

impl Inflater {
    /// Create an inflater whose back-reference history starts as `dictionary`.
    pub(crate) fn new(dictionary: &[u8]) -> Result<Self> {
        let mut inflater = Self {
            decompress: Decompress::new(false),
            input: BytesMut::with_capacity(INPUT_CHUNK + DEFLATE_TAIL.len()),
            scratch: vec![0u8; INPUT_CHUNK],
            source_done: false,
        };
        inflater.prime(dictionary)?;
        Ok(inflater)
    }

    /// Load history by inflating non-final stored blocks carrying the
    /// dictionary and discarding the output.
    fn prime(&mut self, dictionary: &[u8]) -> Result<()> {
        if dictionary.is_empty() {
            return Ok(());
        }

        let mut blocks = Vec::with_capacity(dictionary.len() + 5);
        for chunk in dictionary.chunks(MAX_STORED_BLOCK) {
            let len = chunk.len() as u16;
            blocks.push(0x00);
            blocks.extend_from_slice(&len.to_le_bytes());
            blocks.extend_from_slice(&(!len).to_le_bytes());
            blocks.extend_from_slice(chunk);
        }

        let mut sink = vec![0u8; dictionary.len()];
        let mut offset = 0;
        while offset < blocks.len() {
            let before_in = self.decompress.total_in();
            self.decompress
                .decompress(&blocks[offset..], &mut sink, FlushDecompress::None)
                .map_err(|err| ConnError::Decompress(err.to_string()))?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            if consumed == 0 {
                return Err(ConnError::Decompress(
                    "failed to load compression dictionary".to_string(),
                ));
            }
            offset += consumed;
        }
        Ok(())
    }

    /// Inflate as much as possible into `out`.
    pub(crate) fn inflate(&mut self, out: &mut [u8]) -> Result<Inflated> {
        if out.is_empty() {
            return Ok(Inflated::Data(0));
        }

        loop {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(&self.input, out, FlushDecompress::Sync)
                .map_err(|err| ConnError::Decompress(err.to_string()))?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;
            self.input.advance(consumed);

            if produced > 0 {
                return Ok(Inflated::Data(produced));
            }
            if status == Status::StreamEnd {
                return Ok(Inflated::End);
            }
            if consumed == 0 {
                return Ok(if self.source_done {
                    Inflated::End
                } else {
                    Inflated::NeedInput
                });
            }
        }
    }

    /// Queue the first `n` bytes of `scratch` as compressed input.
    pub(crate) fn feed(&mut self, n: usize) {
        self.input.extend_from_slice(&self.scratch[..n]);
    }

    /// Mark the compressed payload complete and append the deflate tail.
    pub(crate) fn finish(&mut self) {
        if !self.source_done {
            self.input.extend_from_slice(&DEFLATE_TAIL);
            self.source_done = true;
        }
    }
}
