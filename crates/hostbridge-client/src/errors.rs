//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::client::CallError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("invalid --params JSON: {0}")]
    ParseParameters(serde_json::Error),
    #[error("--params must be a JSON object")]
    ParametersNotObject,
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("failed to serialise result data: {0}")]
    SerialiseData(serde_json::Error),
    #[error("failed to write result data: {0}")]
    EmitData(io::Error),
}
