//! Executor-side transport.
//!
//! A [`SocketListener`] binds the configured endpoint and accepts connections
//! on a background thread. Every accepted connection is handed to the
//! [`SessionSlot`], which keeps exactly one peer authoritative, decodes its
//! request frames into the execution queue and writes responses back.

mod errors;
mod listener;
mod session;
mod stream;

#[cfg(test)]
mod session_tests;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub(crate) use self::session::SessionSlot;
pub(crate) use self::stream::{ConnectionHandler, ConnectionStream};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
