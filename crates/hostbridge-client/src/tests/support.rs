//! Harness types shared by the CLI unit and behaviour tests.

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::{Context, Result, ensure};
use hostbridge_config::{Config, SocketEndpoint};
use hostbridge_wire::{CommandRequest, CommandResponse};

use crate::test_support::{FakeExecutor, Reply};
use crate::{AppError, ConfigLoader, run_with_loader};

/// A config loader that returns a fixed configuration.
pub(super) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(super) fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// Fast-failing configuration pointing at `endpoint`.
pub(super) fn config_for(endpoint: SocketEndpoint) -> Config {
    Config {
        bridge_socket: endpoint,
        reconnect_interval_ms: 50,
        handshake_timeout_ms: 500,
        call_timeout_ms: 2_000,
        ..Config::default()
    }
}

/// Endpoint on which nothing is listening.
pub(super) fn unused_endpoint() -> SocketEndpoint {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    SocketEndpoint::tcp("127.0.0.1", port)
}

pub(super) fn reject(request: &CommandRequest) -> Reply {
    Reply::Respond(CommandResponse::failure(
        request.request_id.clone(),
        format!("command not implemented: {}", request.command_name),
    ))
}

/// CLI state, executor instance and captured output for one scenario.
pub(super) struct TestWorld {
    pub config: Config,
    pub executor: Option<FakeExecutor>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<ExitCode>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self {
            config: config_for(unused_endpoint()),
            executor: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
        }
    }
}

impl TestWorld {
    pub fn start_executor(&mut self, executor: FakeExecutor) {
        self.config.bridge_socket = executor.endpoint();
        self.executor = Some(executor);
    }

    pub fn run_args(&mut self, args: Vec<OsString>) {
        self.stdout.clear();
        self.stderr.clear();
        let loader = StaticConfigLoader::new(self.config.clone());
        let exit = run_with_loader(args, &mut self.stdout, &mut self.stderr, &loader);
        self.exit_code = Some(exit);
    }

    pub fn run(&mut self, command: &str) {
        self.run_args(build_args(command));
    }

    pub fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone()).context("stdout utf8")
    }

    pub fn stderr_text(&self) -> Result<String> {
        String::from_utf8(self.stderr.clone()).context("stderr utf8")
    }

    pub fn assert_exit(&self, expected: ExitCode) -> Result<()> {
        let exit = self.exit_code.context("exit code recorded")?;
        ensure!(
            exit == expected,
            "unexpected exit {exit:?}; stderr: {}",
            self.stderr_text()?
        );
        Ok(())
    }

    pub fn executor_requests(&self) -> Result<Vec<CommandRequest>> {
        self.executor
            .as_ref()
            .map(FakeExecutor::requests)
            .context("executor started")
    }
}

pub(super) fn build_args(command: &str) -> Vec<OsString> {
    let mut args = vec![OsString::from("hostbridge")];
    args.extend(command.split_whitespace().map(OsString::from));
    args
}
