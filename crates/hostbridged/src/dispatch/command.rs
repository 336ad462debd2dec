//! Handler contract and typed parameter decoding.

use hostbridge_wire::Parameters;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{DispatchError, HandlerError};

/// Handler invocation with its parameters already validated.
pub type BoundCommand<'a, H> = Box<dyn FnOnce(&mut H) -> Result<Value, HandlerError> + 'a>;

/// Object-safe handler interface stored in the registry.
pub trait CommandHandler<H>: Send + Sync {
    /// Canonical command name.
    fn name(&self) -> &'static str;

    /// Whether the handler changes host state and needs a transaction.
    fn mutates(&self) -> bool;

    /// Validates `parameters` and returns the deferred invocation.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArguments`] when the parameters do not
    /// satisfy the handler's contract; the handler body never runs.
    fn bind<'a>(&'a self, parameters: &Parameters) -> Result<BoundCommand<'a, H>, DispatchError>;
}

/// Statically typed command; implement this rather than [`CommandHandler`].
pub trait Command<H>: Send + Sync + 'static {
    /// Parameter shape, decoded from the request's `Parameters` object.
    type Params: DeserializeOwned + 'static;

    /// Canonical command name.
    const NAME: &'static str;

    /// Whether the command changes host state.
    const MUTATES: bool = false;

    /// Runs the command on the privileged thread.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] describing the domain failure.
    fn run(&self, host: &mut H, params: Self::Params) -> Result<Value, HandlerError>;
}

impl<H, C> CommandHandler<H> for C
where
    C: Command<H>,
    H: 'static,
{
    fn name(&self) -> &'static str {
        C::NAME
    }

    fn mutates(&self) -> bool {
        C::MUTATES
    }

    fn bind<'a>(&'a self, parameters: &Parameters) -> Result<BoundCommand<'a, H>, DispatchError> {
        let params = decode_parameters::<C::Params>(C::NAME, parameters)?;
        Ok(Box::new(move |host: &mut H| self.run(host, params)))
    }
}

/// Decodes a parameter map into `T`.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidArguments`] naming the first violated
/// constraint (missing field, wrong type, unknown variant).
pub fn decode_parameters<T>(command: &'static str, parameters: &Parameters) -> Result<T, DispatchError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|error| DispatchError::invalid_arguments(command, error.to_string()))
}
