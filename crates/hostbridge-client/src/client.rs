//! Request/response calls over a [`ClientSession`].

use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use hostbridge_config::Config;
use hostbridge_wire::{
    CommandRequest, ConnectionState, Parameters, RequestId, WireError, decode_response,
    encode_request,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::RequestRegistry;
use crate::session::{ClientSession, FrameHandler, SessionError, SessionSettings};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Failures of a single call.
#[derive(Debug, Error)]
pub enum CallError {
    /// No connection could be established within the call's time budget.
    #[error("bridge is not connected: {source}")]
    NotConnected {
        /// Last session failure.
        #[source]
        source: SessionError,
    },
    /// No response arrived before the deadline.
    #[error("call {request_id} timed out after {timeout:?}")]
    Timeout {
        /// Identifier of the abandoned call.
        request_id: RequestId,
        /// Budget that elapsed.
        timeout: Duration,
    },
    /// The executor reported a failure.
    #[error("{message}")]
    Remote {
        /// Failure text from the executor.
        message: String,
    },
    /// The request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] WireError),
}

/// Routes decoded responses into the registry.
pub struct ResponseRouter {
    registry: Arc<RequestRegistry>,
}

impl ResponseRouter {
    /// Builds a router that resolves calls in `registry`.
    #[must_use]
    pub const fn new(registry: Arc<RequestRegistry>) -> Self {
        Self { registry }
    }
}

impl FrameHandler for ResponseRouter {
    fn on_frame(&self, frame: &[u8]) {
        match decode_response(frame) {
            Ok(response) => {
                self.registry.resolve(response);
            }
            Err(error) => warn!(
                target: CLIENT_TARGET,
                error = %error,
                "discarding undecodable response frame"
            ),
        }
    }

    fn on_disconnect(&self) {
        // Outstanding calls keep waiting for their own deadline.
        debug!(
            target: CLIENT_TARGET,
            pending = self.registry.pending_count(),
            "connection lost with calls outstanding"
        );
    }
}

/// Caller-side entry point: one session plus the pending-call registry.
pub struct BridgeClient {
    session: ClientSession,
    registry: Arc<RequestRegistry>,
    call_timeout: Duration,
}

impl BridgeClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(settings: SessionSettings, call_timeout: Duration) -> Self {
        let registry = Arc::new(RequestRegistry::new());
        let router = Arc::new(ResponseRouter::new(Arc::clone(&registry)));
        Self {
            session: ClientSession::new(settings, router),
            registry,
            call_timeout,
        }
    }

    /// Creates a disconnected client from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(SessionSettings::from_config(config), config.call_timeout())
    }

    /// Makes one connection attempt.
    ///
    /// # Errors
    ///
    /// Returns the session failure; a retry is scheduled in the background.
    pub fn connect(&self) -> Result<(), SessionError> {
        self.session.connect()
    }

    /// Connection state of the underlying session.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Pending-call registry, for diagnostics.
    #[must_use]
    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Calls `command` with the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`BridgeClient::call_with_timeout`].
    pub fn call(&self, command: &str, parameters: Parameters) -> Result<Value, CallError> {
        self.call_with_timeout(command, parameters, self.call_timeout)
    }

    /// Calls `command` and waits up to `timeout` for its response.
    ///
    /// When disconnected the client first tries to connect within the same
    /// budget. A successful response yields its data (`null` when absent).
    ///
    /// # Errors
    ///
    /// - [`CallError::NotConnected`] when no connection could be made or the
    ///   frame could not be sent.
    /// - [`CallError::Timeout`] when the deadline passes first.
    /// - [`CallError::Remote`] when the executor reports a failure.
    pub fn call_with_timeout(
        &self,
        command: &str,
        parameters: Parameters,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let deadline = Instant::now() + timeout;
        if self.session.state() != ConnectionState::Connected {
            self.session
                .connect_within(timeout)
                .map_err(|source| CallError::NotConnected { source })?;
        }

        let (request_id, receiver) = self.registry.register(deadline);
        let request = CommandRequest::new(command, parameters, request_id.clone());
        let frame = match encode_request(&request) {
            Ok(frame) => frame,
            Err(error) => {
                self.registry.cancel(&request_id);
                return Err(CallError::Encode(error));
            }
        };
        if let Err(source) = self.session.send(&frame) {
            self.registry.cancel(&request_id);
            return Err(CallError::NotConnected { source });
        }
        debug!(
            target: CLIENT_TARGET,
            request_id = %request_id,
            command,
            "call sent"
        );

        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(response) => response
                .into_outcome()
                .map_err(|message| CallError::Remote { message }),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                self.registry.cancel(&request_id);
                Err(CallError::Timeout {
                    request_id,
                    timeout,
                })
            }
        }
    }

    /// Closes the session; outstanding calls run out their deadlines.
    pub fn close(&self) {
        self.session.close();
    }
}
