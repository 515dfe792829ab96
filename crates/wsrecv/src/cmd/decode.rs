use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{debug, info};
use wsrecv_conn::{Conn, ConnError};

use crate::cmd::DecodeArgs;
use crate::exit::{conn_error, io_error, CliResult, SUCCESS};
use crate::output::{print_close, print_message, OutputFormat};

pub async fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.conn.resolve()?;
    let capture = read_capture(args.input.as_deref())?;
    let source = args
        .input
        .as_ref()
        .map_or_else(|| "stdin".to_string(), |path| path.display().to_string());
    info!(source = %source, bytes = capture.len(), role = ?config.role, "decoding capture");

    // Replies the connection would send (pongs, close echoes) are discarded.
    let conn = Conn::from_parts(Cursor::new(capture), tokio::io::sink(), config);
    let mut printed = 0usize;

    loop {
        if args.count.is_some_and(|count| printed >= count) {
            return Ok(SUCCESS);
        }

        match conn.read(None).await {
            Ok((kind, payload)) => {
                print_message(kind, &payload, &source, format);
                printed += 1;
            }
            Err(ConnError::ClosedByPeer(frame)) => {
                print_close(&frame, &source, format);
                return Ok(SUCCESS);
            }
            Err(ConnError::ConnectionLost) => {
                debug!(messages = printed, "end of capture");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(conn_error("decode failed", err)),
        }
    }
}

fn read_capture(path: Option<&Path>) -> CliResult<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path)
            .map_err(|err| io_error(&format!("failed to read {}", path.display()), err)),
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .map_err(|err| io_error("failed to read stdin", err))?;
            Ok(data)
        }
    }
}
