#![forbid(unsafe_code)]
//! Integration test harness.
//!
//! Tests are plain functions over an `IntegrationTestCase`, registered in `TestSuite`s and run by an
//! `IntegrationTestRunner`. A test case owns its fixtures: Docker containers, background processes and mock HTTP
//! servers. Everything a test starts is released at tear-down, and the commands it ran are captured to a log file
//! according to the capture scheme.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests, and a panic inside a registered test is how
//!   assertions report a failure.

pub mod cleanup;
pub mod cli;
pub mod container;
pub mod errors;
pub mod http;
pub mod logging;
pub mod process;
pub mod readiness;
pub mod reports;
pub mod runner;
pub mod settings;
pub mod testcase;
pub mod utils;

pub use itkit_core::{CommandResult, TestCaseResults, TestStatus, constants};
pub use itkit_mock::{MockServer, ResponseInfo, ServerConfig, ServerResponses};

pub use cleanup::Cleanup;
pub use container::{Container, ContainerFixture, ContainerRuntime, ContainerSpec, DockerRuntime, FakeRuntime};
pub use errors::{HarnessError, HarnessResult};
pub use process::BackgroundProcess;
pub use readiness::{PollConfig, Readiness};
pub use runner::{IntegrationTestRunner, NoUserArgs, RunnerArgs, TestDef, TestSuite, UserArgs};
pub use settings::{CaptureScheme, Settings};
pub use testcase::IntegrationTestCase;
