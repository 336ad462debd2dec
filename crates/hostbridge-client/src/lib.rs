//! Caller side of the host bridge.
//!
//! [`BridgeClient`] issues command requests to the executor over one
//! persistent [`ClientSession`] and correlates each response with its call
//! through the [`RequestRegistry`]. The `hostbridge` binary wraps a single
//! call behind a small command-line interface; [`run`] is its entry point and
//! accepts substitutable IO streams so tests can drive it directly.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;
use hostbridge_config::Config;
use hostbridge_wire::Parameters;
use serde_json::Value;

mod cli;
mod client;
mod config;
mod errors;
pub mod registry;
pub mod session;
pub mod telemetry;
mod transport;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

use cli::{Cli, CliCommand};
pub use client::{BridgeClient, CallError, ResponseRouter};
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;
pub use registry::RequestRegistry;
pub use session::{
    ClientSession, Clock, FrameHandler, ManualClock, ReconnectSchedule, SessionError,
    SessionSettings, SystemClock,
};

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `hostbridge_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--bridge-socket",
    "--log-filter",
    "--log-format",
    "--reconnect-interval-ms",
    "--call-timeout-ms",
    "--handshake-timeout-ms",
];

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli_arguments = prepare_cli_arguments(&args, &split);

    let cli = match Cli::try_parse_from(cli_arguments) {
        Ok(cli) => cli,
        Err(error) => return report_usage(error, stdout, stderr),
    };

    let result = loader
        .load(&split.config_arguments)
        .and_then(|config| execute(cli, &config, stdout));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if let Some(rest) = args.get(split.command_start..) {
        cli_arguments.extend(rest.iter().cloned());
    }
    cli_arguments
}

fn report_usage<W, E>(error: clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = write!(stdout, "{}", error.render());
            ExitCode::SUCCESS
        }
        _ => {
            let _ = writeln!(stderr, "{}", AppError::CliUsage(error));
            ExitCode::FAILURE
        }
    }
}

fn execute<W>(cli: Cli, config: &Config, stdout: &mut W) -> Result<(), AppError>
where
    W: Write,
{
    telemetry::initialise(config)?;
    match cli.command {
        CliCommand::Call {
            command,
            params,
            timeout_ms,
        } => {
            let parameters = parse_parameters(params.as_deref())?;
            let timeout = timeout_ms.map_or_else(|| config.call_timeout(), Duration::from_millis);
            let client = BridgeClient::from_config(config);
            let outcome = client.call_with_timeout(&command, parameters, timeout);
            client.close();
            emit_data(&outcome?, stdout)
        }
    }
}

fn parse_parameters(raw: Option<&str>) -> Result<Parameters, AppError> {
    let Some(raw) = raw else {
        return Ok(Parameters::new());
    };
    match serde_json::from_str(raw).map_err(AppError::ParseParameters)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Parameters::new()),
        _ => Err(AppError::ParametersNotObject),
    }
}

fn emit_data<W>(data: &Value, stdout: &mut W) -> Result<(), AppError>
where
    W: Write,
{
    serde_json::to_writer(&mut *stdout, data).map_err(AppError::SerialiseData)?;
    stdout.write_all(b"\n").map_err(AppError::EmitData)?;
    stdout.flush().map_err(AppError::EmitData)
}
