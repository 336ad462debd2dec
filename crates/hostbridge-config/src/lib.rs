//! Shared configuration for the host bridge binaries.
//!
//! Both the executor (`hostbridged`) and the caller-side client
//! (`hostbridge`) resolve the same [`Config`] so they agree on the socket
//! endpoint and the timing budget of the bridge. Values are layered by
//! `ortho_config`: defaults, then a TOML file (`--config-path` or
//! `HOSTBRIDGE_CONFIG_PATH`), then `HOSTBRIDGE_*` environment variables, then
//! command-line flags.

mod defaults;
mod logging;
mod runtime;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_LOG_FILTER,
    DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_TCP_PORT, default_log_filter,
    default_log_filter_string, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved configuration shared by the caller and executor sides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "HOSTBRIDGE")]
pub struct Config {
    /// Socket the executor listens on and the caller connects to.
    #[ortho_config(default = default_socket_endpoint())]
    pub bridge_socket: SocketEndpoint,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Constant delay between reconnection attempts, in milliseconds.
    #[ortho_config(default = DEFAULT_RECONNECT_INTERVAL_MS)]
    pub reconnect_interval_ms: u64,
    /// Deadline applied to each outbound call, in milliseconds.
    #[ortho_config(default = DEFAULT_CALL_TIMEOUT_MS)]
    pub call_timeout_ms: u64,
    /// Budget for a single connection handshake, in milliseconds.
    #[ortho_config(default = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    pub handshake_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Socket endpoint shared by both sides of the bridge.
    #[must_use]
    pub const fn bridge_socket(&self) -> &SocketEndpoint {
        &self.bridge_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Delay between reconnection attempts.
    #[must_use]
    pub const fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Deadline applied to each outbound call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Budget for a single connection handshake.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
