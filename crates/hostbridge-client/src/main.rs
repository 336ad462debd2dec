//! CLI entrypoint for the host bridge.
//!
//! Delegates to [`hostbridge_client::run`], which loads configuration, issues
//! one call to the configured executor and prints its result data.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: session threads log to stderr while the call waits.
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    hostbridge_client::run(std::env::args_os(), &mut stdout, &mut stderr)
}
