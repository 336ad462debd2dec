//! Test suites for the executor.

pub(crate) mod support;
