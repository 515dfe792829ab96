use bytes::Buf;
use tokio::time::Instant;
use tracing::trace;
use wsrecv_frame::{apply_mask, FrameHeader, Opcode, StatusCode, MAX_CONTROL_PAYLOAD};

use crate::conn::Inner;
use crate::error::{ConnError, Result};
use crate::source::{FrameSource, ReadFailure};

impl Inner {
    /// Pull frames until a data frame header arrives, servicing control
    /// frames on the way.
    ///
    /// The returned header has been consumed from the source; its payload
    /// has not.
    pub(crate) async fn next_data_frame(
        &self,
        source: &mut FrameSource,
        deadline: Option<Instant>,
    ) -> Result<FrameHeader> {
        loop {
            let (header, size) = match source.peek_header(deadline, self.close.token()).await {
                Ok(decoded) => decoded,
                Err(failure) => return Err(self.read_failure(failure).await),
            };

            if let Err(violation) = self.check_header(&header) {
                let err = ConnError::Protocol(violation);
                return Err(self.fail_with_close(StatusCode::PROTOCOL_ERROR, err).await);
            }

            if header.opcode.is_data() {
                source.consume(size);
                trace!(
                    opcode = %header.opcode,
                    len = header.payload_len,
                    fin = header.fin,
                    rsv1 = header.rsv1,
                    "received data frame header"
                );
                return Ok(header);
            }

            // Bounded by MAX_CONTROL_PAYLOAD after check_header.
            let total = size + header.payload_len as usize;
            let control_deadline = Instant::now() + self.config.control_timeout;
            let caller_first = deadline.is_some_and(|deadline| deadline < control_deadline);
            let wait_until = if caller_first { deadline } else { Some(control_deadline) };

            if let Err(failure) = source.fill_to(total, wait_until, self.close.token()).await {
                return Err(match failure {
                    ReadFailure::Deadline if caller_first => ConnError::DeadlineExceeded,
                    ReadFailure::Deadline => self.fail(ConnError::ControlTimeout).await,
                    other => self.read_failure(other).await,
                });
            }

            let mut frame = source.take(total);
            frame.advance(size);
            if let Some(key) = header.mask {
                apply_mask(key, 0, &mut frame);
            }
            self.handle_control(header.opcode, frame.freeze()).await?;
        }
    }

    /// Per-frame protocol checks. Returns the violation as a close reason.
    fn check_header(&self, header: &FrameHeader) -> std::result::Result<(), String> {
        if header.rsv2 || header.rsv3 {
            return Err("received header with unexpected rsv bits set".to_string());
        }
        if header.rsv1 {
            let initiating = matches!(header.opcode, Opcode::Text | Opcode::Binary);
            if self.config.compression.is_none() || !initiating {
                return Err("received header with unexpected rsv bits set".to_string());
            }
        }

        match (self.config.role.expects_masked(), header.mask.is_some()) {
            (true, false) => return Err("received unmasked frame from client".to_string()),
            (false, true) => return Err("received masked frame from server".to_string()),
            _ => {}
        }

        if let Opcode::Reserved(_) = header.opcode {
            return Err(format!("received unknown opcode {}", header.opcode));
        }

        if header.opcode.is_control() {
            if header.payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(format!(
                    "received control frame payload with invalid length: {}",
                    header.payload_len
                ));
            }
            if !header.fin {
                return Err("received fragmented control frame".to_string());
            }
        }

        Ok(())
    }
}
