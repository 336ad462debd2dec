//! BDD step definitions for the bridge CLI.
//!
//! These steps map the scenarios in `tests/features/hostbridge_cli.feature`
//! to harness operations that exercise the CLI against a fake executor.

use super::support::{TestWorld, build_args, reject};
use crate::test_support::{FakeExecutor, Reply};

use std::cell::RefCell;
use std::ffi::OsString;
use std::process::ExitCode;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}

#[given("an executor that echoes every call")]
fn given_echo_executor(world: &RefCell<TestWorld>) {
    world.borrow_mut().start_executor(FakeExecutor::echo());
}

#[given("an executor that rejects every call")]
fn given_rejecting_executor(world: &RefCell<TestWorld>) {
    world.borrow_mut().start_executor(FakeExecutor::spawn(reject));
}

#[given("an executor that never answers")]
fn given_silent_executor(world: &RefCell<TestWorld>) {
    world
        .borrow_mut()
        .start_executor(FakeExecutor::spawn(|_| Reply::Silent));
}

#[given("no executor is listening")]
fn given_no_executor(world: &RefCell<TestWorld>) {
    assert!(world.borrow().executor.is_none());
}

#[when("the operator runs \"{command}\"")]
fn when_operator_runs(world: &RefCell<TestWorld>, command: String) {
    world.borrow_mut().run(&command);
}

#[when("the operator calls \"{command}\" with a verbose flag")]
fn when_operator_calls_verbose(world: &RefCell<TestWorld>, command: String) {
    let mut args = build_args("call");
    args.push(OsString::from(command));
    args.push(OsString::from("--params"));
    args.push(OsString::from(json!({ "Verbose": true }).to_string()));
    world.borrow_mut().run_args(args);
}

#[then("the CLI exits successfully")]
fn then_success(world: &RefCell<TestWorld>) {
    world
        .borrow()
        .assert_exit(ExitCode::SUCCESS)
        .expect("CLI did not succeed");
}

#[then("the CLI exits with failure")]
fn then_failure(world: &RefCell<TestWorld>) {
    world
        .borrow()
        .assert_exit(ExitCode::FAILURE)
        .expect("CLI did not fail as expected");
}

#[then("stdout echoes the command \"{command}\"")]
fn then_stdout_echoes(world: &RefCell<TestWorld>, command: String) {
    let stdout = world.borrow().stdout_text().expect("stdout text");
    assert!(stdout.ends_with('\n'), "result data is newline terminated");
    let data: Value = serde_json::from_str(stdout.trim_end()).expect("stdout is JSON");
    assert_eq!(
        data,
        json!({ "Command": command, "Parameters": { "Verbose": true } })
    );
}

#[then("stderr mentions \"{text}\"")]
fn then_stderr_mentions(world: &RefCell<TestWorld>, text: String) {
    let stderr = world.borrow().stderr_text().expect("stderr text");
    assert!(stderr.contains(&text), "stderr was: {stderr}");
}

#[then("the executor received exactly one call")]
fn then_one_call(world: &RefCell<TestWorld>) {
    let requests = world.borrow().executor_requests().expect("requests");
    assert_eq!(requests.len(), 1);
}

#[then("the executor received no calls")]
fn then_no_calls(world: &RefCell<TestWorld>) {
    let requests = world.borrow().executor_requests().expect("requests");
    assert!(requests.is_empty());
}

#[scenario(
    path = "tests/features/hostbridge_cli.feature",
    name = "A successful call prints its result data"
)]
fn successful_call(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/hostbridge_cli.feature",
    name = "An executor failure is reported on stderr"
)]
fn remote_failure(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/hostbridge_cli.feature",
    name = "A silent executor makes the call time out"
)]
fn silent_executor(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/hostbridge_cli.feature",
    name = "A missing executor is reported as not connected"
)]
fn missing_executor(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/hostbridge_cli.feature",
    name = "Parameters must be a JSON object"
)]
fn parameters_must_be_object(world: RefCell<TestWorld>) {
    let _ = world;
}
