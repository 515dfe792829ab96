use std::fmt;
use std::io;

use wsrecv_conn::ConnError;

// Exit codes follow the sysexits-style layout shared by the other 3leaps tools.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_exit_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_exit_code(err.kind()), format!("{context}: {err}"))
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    let code = match &err {
        ConnError::Transport(source) => io_exit_code(source.kind()),
        ConnError::ConnectionLost => TRANSPORT_ERROR,
        ConnError::Protocol(_)
        | ConnError::ReadLimited { .. }
        | ConnError::Decompress(_)
        | ConnError::Frame(_) => DATA_INVALID,
        ConnError::DeadlineExceeded | ConnError::ControlTimeout => TIMEOUT,
        ConnError::ClosedByPeer(_) | ConnError::ClosedLocally(_) => FAILURE,
        ConnError::ReadClosed => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}
