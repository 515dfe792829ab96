use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use wsrecv_conn::{Conn, ConnError};
use wsrecv_frame::StatusCode;

use crate::cmd::ListenArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::{print_close, print_message, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.conn.resolve()?;
    let listener = TcpListener::bind(&args.addr)
        .await
        .map_err(|err| io_error("bind failed", err))?;
    info!(addr = %args.addr, role = ?config.role, "listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    loop {
        let (stream, remote) = tokio::select! {
            _ = &mut shutdown => return Ok(SUCCESS),
            accepted = listener.accept() => {
                accepted.map_err(|err| io_error("accept failed", err))?
            }
        };
        let source = remote.to_string();
        info!(peer = %source, "accepted connection");
        let conn = Conn::new(stream, config.clone());

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => {
                    if let Err(err) = conn
                        .close(StatusCode::GOING_AWAY, "listener shutting down", None)
                        .await
                    {
                        debug!(peer = %source, error = %err, "close handshake did not complete");
                    }
                    return Ok(SUCCESS);
                }
                received = conn.read(None) => received,
            };

            match received {
                Ok((kind, payload)) => {
                    print_message(kind, &payload, &source, format);
                    printed += 1;
                    if args.count.is_some_and(|count| printed >= count) {
                        if let Err(err) = conn.close(StatusCode::NORMAL_CLOSURE, "", None).await {
                            debug!(peer = %source, error = %err, "close handshake did not complete");
                        }
                        return Ok(SUCCESS);
                    }
                }
                Err(ConnError::ClosedByPeer(frame)) => {
                    print_close(&frame, &source, format);
                    break;
                }
                Err(err) => {
                    warn!(peer = %source, error = %err, "connection ended");
                    break;
                }
            }
        }
    }
}
