//! CLI argument definitions for the `hostbridge` binary.

use clap::{Parser, Subcommand};

/// Command-line interface for issuing calls to a running executor.
#[derive(Parser, Debug)]
#[command(
    name = "hostbridge",
    version,
    about = "Issue commands to a host application through the bridge",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Structured subcommands for the bridge CLI.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Sends one command and prints its result data as JSON.
    Call {
        /// Command name; the executor matches it case-insensitively.
        #[arg(value_name = "COMMAND")]
        command: String,
        /// Command parameters as a JSON object.
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
        /// Overrides the configured call timeout.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
}
