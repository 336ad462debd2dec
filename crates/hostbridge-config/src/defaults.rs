use crate::socket::SocketEndpoint;

/// Default host the executor binds and the caller dials.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port of the bridge socket.
pub const DEFAULT_TCP_PORT: u16 = 8765;

/// Default constant delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Default deadline of an outbound call.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default budget for a connection handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Computes the default socket endpoint of the bridge.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_TCP_PORT)
}
