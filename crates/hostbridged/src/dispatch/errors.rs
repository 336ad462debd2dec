//! Error types for command dispatch failures.
//!
//! Every variant is rendered into the `Error` text of a failure response, so
//! messages are written for the remote caller rather than for local logs.

use thiserror::Error;

use super::transaction::TransactionError;

/// Errors surfaced while dispatching a request to its handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered under the requested name.
    #[error("command not implemented: {name}")]
    UnknownCommand {
        /// Name as sent by the caller.
        name: String,
    },

    /// Parameters did not decode into the handler's parameter type.
    #[error("invalid parameters for {command}: {message}")]
    InvalidArguments {
        /// Canonical command name.
        command: &'static str,
        /// Violated constraint.
        message: String,
    },

    /// Request frame could not be decoded.
    #[error("invalid request: {message}")]
    InvalidStructure {
        /// Decoder diagnostic.
        message: String,
    },

    /// The handler ran and reported a failure.
    #[error("{command}: {source}")]
    Handler {
        /// Canonical command name.
        command: &'static str,
        /// Failure reported by the handler.
        #[source]
        source: HandlerError,
    },

    /// The host transaction could not be opened or committed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The handler panicked; its transaction was rolled back.
    #[error("command panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The executor is stopping and no longer accepts work.
    #[error("executor is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    /// Creates an unknown command error.
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::UnknownCommand { name: name.into() }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(command: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command,
            message: message.into(),
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Wraps a handler failure.
    pub fn handler(command: &'static str, source: HandlerError) -> Self {
        Self::Handler { command, source }
    }

    /// Creates a panic error.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }
}

/// Domain failures reported by command handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A referenced element does not exist.
    #[error("element {id} not found")]
    ElementNotFound {
        /// Requested element identifier.
        id: i64,
    },
    /// The host has no level to place new elements on.
    #[error("no level available")]
    NoLevel,
    /// The request was well-formed but the host refused it.
    #[error("{0}")]
    Rejected(String),
}

impl HandlerError {
    /// Creates a rejection with a free-form reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}
