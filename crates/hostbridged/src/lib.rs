//! Executor side of the host bridge.
//!
//! The executor accepts one caller connection at a time and runs the
//! commands it sends against a host whose API may only be touched from a
//! single privileged thread. Requests flow through four stages:
//!
//! 1. **Transport.** A socket listener accepts connections. The session slot
//!    keeps exactly one of them authoritative and decodes its JSONL request
//!    frames.
//! 2. **Execution queue.** Decoded requests are queued from the I/O thread
//!    without blocking and drained strictly in order by the thread that owns
//!    the host ([`queue`]).
//! 3. **Dispatch.** The [`dispatch::Dispatcher`] resolves the command name,
//!    validates its parameters and runs the handler, wrapping mutating
//!    handlers in a host transaction that rolls back on failure or panic.
//! 4. **Response.** Every outcome becomes a response that echoes the request
//!    id and is written back over the connection the request arrived on.
//!
//! [`service::BridgeService`] owns this wiring and its start/stop lifecycle.
//! The [`host`] module ships an in-memory building model with a handful of
//! commands so the bridge is runnable end to end.

mod bootstrap;
pub mod dispatch;
mod health;
pub mod host;
pub mod queue;
mod runtime;
pub mod service;
mod shutdown;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use runtime::{LaunchError, run_executor};
pub use service::{BridgeService, ServiceError, ServiceState};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
