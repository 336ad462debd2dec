//! Errors raised by the caller-side transport session.

use std::io;
use std::time::Duration;

use hostbridge_wire::WireError;
use thiserror::Error;

/// Failures surfaced while connecting or sending.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The endpoint host name did not resolve.
    #[error("failed to resolve bridge address {endpoint}: {source}")]
    Resolve {
        /// Endpoint being dialled.
        endpoint: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The connection attempt was refused or failed.
    #[error("failed to connect to bridge at {endpoint}: {source}")]
    Connect {
        /// Endpoint being dialled.
        endpoint: String,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// The handshake did not complete in time.
    #[error("handshake with {endpoint} did not complete within {timeout:?}")]
    HandshakeTimeout {
        /// Endpoint being dialled.
        endpoint: String,
        /// Budget that elapsed.
        timeout: Duration,
    },
    /// Unix sockets are unavailable on this platform.
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
    /// `send` was called while the session was not connected.
    #[error("bridge session is not connected")]
    NotConnected,
    /// The session was closed while an operation was in progress.
    #[error("bridge session is closed")]
    Closed,
    /// Writing a frame failed; the connection has been dropped.
    #[error("failed to send frame: {0}")]
    Send(#[source] WireError),
    /// Splitting a new connection into reader and writer handles failed.
    #[error("failed to split connection: {0}")]
    Split(#[source] io::Error),
}
