//! Command dispatch for the executor.
//!
//! A [`Dispatcher`] resolves a request's command name in a
//! [`CommandRegistry`] (case-insensitively), decodes the parameters into the
//! handler's typed parameter struct, and runs the handler against the host.
//! Handlers that mutate host state run inside a [`TransactionScope`]: the
//! scope commits when the handler succeeds and rolls back when it fails or
//! panics. Every outcome becomes a [`hostbridge_wire::CommandResponse`] that
//! echoes the request id.

mod command;
mod dispatcher;
mod errors;
mod registry;
mod transaction;


pub use self::command::{BoundCommand, Command, CommandHandler, decode_parameters};
pub use self::dispatcher::Dispatcher;
pub use self::errors::{DispatchError, HandlerError};
pub use self::registry::CommandRegistry;
pub use self::transaction::{TransactionError, TransactionScope, Transactional};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
