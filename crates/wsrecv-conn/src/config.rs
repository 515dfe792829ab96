use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-message read limit in bytes.
pub const DEFAULT_READ_LIMIT: u64 = 32 * 1024;

/// Deadline for reading one control frame payload and for writing control frames.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a local close waits for the peer's close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which end of the connection this side is.
///
/// Servers require masked inbound frames; clients require unmasked ones
/// and mask what they send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    #[default]
    Server,
}

impl Role {
    /// Whether inbound frames must carry a mask key.
    pub fn expects_masked(self) -> bool {
        self == Role::Server
    }

    /// Whether outbound frames must carry a mask key.
    pub fn masks_outgoing(self) -> bool {
        self == Role::Client
    }
}

/// Negotiated per-message deflate parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// The client resets its compression context after every message.
    pub client_no_context_takeover: bool,
    /// The server resets its compression context after every message.
    pub server_no_context_takeover: bool,
}

impl CompressionConfig {
    /// Whether the peer keeps its deflate window across messages, so this
    /// side must keep the matching inflate dictionary.
    pub fn read_context_takeover(&self, role: Role) -> bool {
        match role {
            Role::Client => !self.server_no_context_takeover,
            Role::Server => !self.client_no_context_takeover,
        }
    }
}

/// Configuration for a connection's read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnConfig {
    /// Local role.
    pub role: Role,
    /// Negotiated compression, `None` if the extension was not agreed.
    pub compression: Option<CompressionConfig>,
    /// Maximum bytes per message. Default: 32 KiB.
    pub read_limit: u64,
    /// Control frame read/write deadline. Default: 5s.
    #[serde(with = "millis")]
    pub control_timeout: Duration,
    /// Close handshake wait. Default: 5s.
    #[serde(with = "millis")]
    pub close_timeout: Duration,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            compression: None,
            read_limit: DEFAULT_READ_LIMIT,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ConnConfig {
    /// Default configuration for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Enable per-message compression.
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Override the per-message read limit.
    pub fn with_read_limit(mut self, read_limit: u64) -> Self {
        self.read_limit = read_limit;
        self
    }

    /// Whether compressed messages use a dictionary carried over from earlier ones.
    pub fn read_context_takeover(&self) -> bool {
        self.compression
            .is_some_and(|compression| compression.read_context_takeover(self.role))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
