//! Foreground executor runtime used by the `hostbridged` binary.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use hostbridge_config::{RuntimePaths, RuntimePathsError};

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::Dispatcher;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::host::{HostDocument, demo_registry};
use crate::service::{BridgeService, FileEnablementStore, ServiceError};
use crate::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const RUNTIME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runtime");

/// Errors that end the executor process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration or telemetry could not be set up.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The runtime directory could not be prepared.
    #[error("failed to prepare runtime directory: {source}")]
    RuntimePaths {
        /// Underlying path error.
        #[source]
        source: RuntimePathsError,
    },
    /// Starting or stopping the service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Waiting for a shutdown signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Runs the executor with the demo host until a termination signal arrives.
///
/// # Errors
///
/// Returns the first failure of bootstrap, service start, signal handling
/// or service stop.
pub fn run_executor() -> Result<(), LaunchError> {
    run_executor_with(
        &SystemConfigLoader,
        &SystemShutdownSignal,
        Arc::new(StructuredHealthReporter::new()),
        HostDocument::sample(),
    )
}

/// Runs the executor with injected collaborators.
pub(crate) fn run_executor_with(
    loader: &dyn ConfigLoader,
    shutdown: &dyn ShutdownSignal,
    reporter: Arc<dyn HealthReporter>,
    host: HostDocument,
) -> Result<(), LaunchError> {
    let config = bootstrap_with(loader, reporter.as_ref())?.into_config();
    let paths =
        RuntimePaths::from_config(&config).map_err(|source| LaunchError::RuntimePaths { source })?;
    let store = Arc::new(FileEnablementStore::from_runtime_paths(&paths));
    let dispatcher = Dispatcher::new(Arc::new(demo_registry()));
    let service = BridgeService::new(host, dispatcher, store, reporter);

    service.start(&config)?;
    info!(
        target: RUNTIME_TARGET,
        endpoint = ?service.local_endpoint(),
        "executor ready"
    );
    let waited = shutdown.wait();
    service.stop()?;
    waited?;
    info!(target: RUNTIME_TARGET, "shutdown sequence completed");
    Ok(())
}
