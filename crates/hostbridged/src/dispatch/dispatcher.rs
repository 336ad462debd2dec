//! Request to response translation on the privileged thread.

use std::sync::Arc;

use hostbridge_wire::{CommandRequest, CommandResponse};
use serde_json::Value;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::registry::CommandRegistry;
use super::transaction::{TransactionScope, Transactional};

/// Resolves commands by name and runs them against the host.
///
/// Only the drain loop calls [`Dispatcher::dispatch`], so at most one handler
/// runs at a time and handlers may assume exclusive access to the host.
pub struct Dispatcher<H> {
    registry: Arc<CommandRegistry<H>>,
}

impl<H> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<H: Transactional> Dispatcher<H> {
    /// Creates a dispatcher over a fixed registry.
    #[must_use]
    pub fn new(registry: Arc<CommandRegistry<H>>) -> Self {
        Self { registry }
    }

    /// Registered commands.
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry<H> {
        &self.registry
    }

    /// Executes `request` and builds the response echoing its id.
    pub fn dispatch(&self, host: &mut H, request: &CommandRequest) -> CommandResponse {
        let request_id = request.request_id.clone();
        match self.execute(host, request) {
            Ok(data) => CommandResponse::success(request_id, data),
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    request_id = %request_id,
                    command = request.command(),
                    error = %error,
                    "command failed"
                );
                CommandResponse::failure(request_id, error.to_string())
            }
        }
    }

    fn execute(&self, host: &mut H, request: &CommandRequest) -> Result<Value, DispatchError> {
        let handler = self
            .registry
            .lookup(request.command())
            .ok_or_else(|| DispatchError::unknown_command(request.command()))?;
        let name = handler.name();
        let command = handler.bind(&request.parameters)?;

        debug!(
            target: DISPATCH_TARGET,
            request_id = %request.request_id,
            command = name,
            mutates = handler.mutates(),
            "dispatching command"
        );

        if !handler.mutates() {
            return command(host).map_err(|source| DispatchError::handler(name, source));
        }

        let mut scope = TransactionScope::begin(host, name)?;
        let data = command(scope.host()).map_err(|source| DispatchError::handler(name, source))?;
        scope.commit()?;
        Ok(data)
    }
}
