//! Structured health reporting for executor lifecycle events.

use std::sync::Arc;

use hostbridge_config::Config;
use hostbridge_config::SocketEndpoint;

use crate::bootstrap::BootstrapError;
use crate::service::{ServiceError, ServiceState};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked on every service state transition.
    fn service_state_changed(&self, previous: ServiceState, current: ServiceState);

    /// Invoked once the service is accepting connections.
    fn service_listening(&self, endpoint: &SocketEndpoint);

    /// Invoked when a lifecycle operation fails.
    fn service_failed(&self, error: &ServiceError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn service_state_changed(&self, previous: ServiceState, current: ServiceState) {
        (**self).service_state_changed(previous, current);
    }

    fn service_listening(&self, endpoint: &SocketEndpoint) {
        (**self).service_listening(endpoint);
    }

    fn service_failed(&self, error: &ServiceError) {
        (**self).service_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting executor bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.bridge_socket(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "executor bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "executor bootstrap failed"
        );
    }

    fn service_state_changed(&self, previous: ServiceState, current: ServiceState) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_state_changed",
            previous = %previous,
            current = %current,
            "service state changed"
        );
    }

    fn service_listening(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_listening",
            endpoint = %endpoint,
            "bridge service listening"
        );
    }

    fn service_failed(&self, error: &ServiceError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_failed",
            error = %error,
            "bridge service operation failed"
        );
    }
}
