//! Lifecycle errors of the bridge service.

use std::io;

use hostbridge_config::SocketPreparationError;
use thiserror::Error;

use super::enablement::EnablementError;
use crate::transport::ListenerError;

/// Failures starting, stopping or resuming the bridge service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The socket directory could not be prepared.
    #[error("failed to prepare bridge socket: {source}")]
    Socket {
        /// Filesystem error.
        #[source]
        source: SocketPreparationError,
    },
    /// The listener could not bind or start.
    #[error("failed to start listener: {source}")]
    Listener {
        /// Listener failure.
        #[source]
        source: ListenerError,
    },
    /// The persisted enable state could not be read.
    #[error("failed to read enable state: {source}")]
    Enablement {
        /// Store failure.
        #[source]
        source: EnablementError,
    },
    /// The privileged thread could not be spawned; the service keeps its host.
    #[error("failed to spawn privileged thread: {source}")]
    PrivilegedThread {
        /// Spawn failure.
        #[source]
        source: io::Error,
    },
    /// The privileged thread panicked outside a command; the host value is lost.
    #[error("privileged thread panicked")]
    PrivilegedThreadPanicked,
    /// No host value is available to start the service with.
    #[error("host is unavailable after an earlier privileged thread failure")]
    HostUnavailable,
}
