use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use wsrecv_conn::{CompressionConfig, ConnConfig, Role};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a captured frame stream and print its messages.
    Decode(DecodeArgs),
    /// Accept already-upgraded TCP streams and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => block_on(decode::run(args, format)),
        Command::Listen(args) => block_on(listen::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(future)
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RoleArg {
    Server,
    Client,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Server => Role::Server,
            RoleArg::Client => Role::Client,
        }
    }
}

/// Connection settings shared by every subcommand that reads frames.
#[derive(Args, Debug)]
pub struct ConnArgs {
    /// Local endpoint role. Servers expect masked frames, clients unmasked ones.
    #[arg(long, value_enum)]
    pub role: Option<RoleArg>,
    /// Treat the stream as having negotiated permessage-deflate.
    #[arg(long)]
    pub compress: bool,
    /// The client resets its compression context after every message.
    #[arg(long, requires = "compress")]
    pub client_no_context_takeover: bool,
    /// The server resets its compression context after every message.
    #[arg(long, requires = "compress")]
    pub server_no_context_takeover: bool,
    /// Maximum size of a single message in bytes.
    #[arg(long, value_name = "BYTES")]
    pub read_limit: Option<u64>,
    /// Time allowed to read a control frame and to write its reply (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub control_timeout: Option<String>,
    /// Load connection settings from a JSON file. Flags override file values.
    #[arg(long, value_name = "FILE", env = "WSRECV_CONFIG")]
    pub config: Option<PathBuf>,
}

impl ConnArgs {
    pub fn resolve(&self) -> CliResult<ConnConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ConnConfig::default(),
        };

        if let Some(role) = self.role {
            config.role = role.into();
        }
        if self.compress {
            config.compression = Some(CompressionConfig {
                client_no_context_takeover: self.client_no_context_takeover,
                server_no_context_takeover: self.server_no_context_takeover,
            });
        }
        if let Some(limit) = self.read_limit {
            config.read_limit = limit;
        }
        if let Some(timeout) = &self.control_timeout {
            config.control_timeout = parse_duration(timeout)?;
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> CliResult<ConnConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed to read {}", path.display()), err))?;
    serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("invalid config {}: {err}", path.display())))
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file holding raw frames. Reads stdin when omitted.
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub conn: ConnArgs,
    /// Stop after this many messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 127.0.0.1:9001).
    pub addr: String,
    #[command(flatten)]
    pub conn: ConnArgs,
    /// Exit after this many messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConnArgs {
        ConnArgs {
            role: None,
            compress: false,
            client_no_context_takeover: false,
            server_no_context_takeover: false,
            read_limit: None,
            control_timeout: None,
            config: None,
        }
    }

    #[test]
    fn parse_duration_accepts_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 2 ").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_rejects_bad_input() {
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
    }

    #[test]
    fn defaults_without_flags() {
        let config = args().resolve().unwrap();
        assert_eq!(config.role, Role::Server);
        assert!(config.compression.is_none());
        assert_eq!(config.read_limit, wsrecv_conn::DEFAULT_READ_LIMIT);
    }

    #[test]
    fn flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("wsrecv-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"role":"client","read_limit":100,"control_timeout":250}"#,
        )
        .unwrap();

        let mut args = args();
        args.config = Some(path.clone());
        args.read_limit = Some(200);
        let config = args.resolve().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.role, Role::Client);
        assert_eq!(config.read_limit, 200);
        assert_eq!(config.control_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_config_is_usage_error() {
        let path = std::env::temp_dir().join(format!("wsrecv-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{not json").unwrap();

        let mut args = args();
        args.config = Some(path.clone());
        let err = args.resolve().unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.code, USAGE);
    }
}
