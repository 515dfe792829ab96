use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, trace};
use wsrecv_frame::{CloseFrame, Opcode, StatusCode};

use crate::conn::Inner;
use crate::error::{ConnError, Result};

/// Outstanding pings, keyed by the payload carried in the ping frame.
///
/// Guarded separately from the read state so issuing a ping never waits
/// behind a slow read.
#[derive(Debug, Default)]
pub(crate) struct Pings {
    waiters: Mutex<HashMap<Bytes, oneshot::Sender<()>>>,
}

impl Pings {
    fn waiters(&self) -> MutexGuard<'_, HashMap<Bytes, oneshot::Sender<()>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `token`. The returned registration removes it again when dropped.
    pub(crate) fn register(&self, token: Bytes) -> (oneshot::Receiver<()>, PingRegistration<'_>) {
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(token.clone(), tx);
        (rx, PingRegistration { pings: self, token })
    }

    /// Signal the waiter for `payload`. Unknown or already answered tokens are ignored.
    pub(crate) fn notify(&self, payload: &[u8]) -> bool {
        match self.waiters().remove(payload) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters().len()
    }
}

/// Removes a ping token from [`Pings`] on every exit path of the waiter.
pub(crate) struct PingRegistration<'a> {
    pings: &'a Pings,
    token: Bytes,
}

impl Drop for PingRegistration<'_> {
    fn drop(&mut self) {
        self.pings.waiters().remove(&self.token);
    }
}

impl Inner {
    /// Service one fully buffered, unmasked control frame.
    ///
    /// A valid close frame records the peer's close, echoes it, tears the
    /// connection down and comes back as `Err(ClosedByPeer)`.
    pub(crate) async fn handle_control(&self, opcode: Opcode, payload: Bytes) -> Result<()> {
        match opcode {
            Opcode::Ping => {
                trace!(len = payload.len(), "received ping");
                self.write_control(Opcode::Pong, &payload).await
            }
            Opcode::Pong => {
                let matched = self.pings.notify(&payload);
                trace!(len = payload.len(), matched, "received pong");
                Ok(())
            }
            Opcode::Close => {
                let frame = match CloseFrame::parse(&payload) {
                    Ok(frame) => frame,
                    Err(err) => {
                        let err = ConnError::Protocol(err.to_string());
                        return Err(self.fail_with_close(StatusCode::PROTOCOL_ERROR, err).await);
                    }
                };
                debug!(code = frame.code.0, reason = %frame.reason, "received close frame");

                self.close.set_peer_close(frame.clone());
                self.close.record(ConnError::ClosedByPeer(frame.clone()));
                match self.send_close(&frame).await {
                    Ok(true) => trace!(code = frame.code.0, "echoed close frame"),
                    Ok(false) => trace!("close frame already sent, not echoing"),
                    Err(err) => debug!(error = %err, "failed to echo close frame"),
                }
                self.teardown().await;
                Err(ConnError::ClosedByPeer(frame))
            }
            other => {
                debug!(opcode = %other, "ignoring non-control opcode in control handler");
                Ok(())
            }
        }
    }
}
