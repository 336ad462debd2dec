//! Unit and behavioural tests for the caller side.

mod behaviour;
mod support;
