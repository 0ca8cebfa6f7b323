//! Provide the shared, I/O-free vocabulary of the itkit integration test harness.
//!
//! Both the harness library and the mock server depend on this crate, so it stays small and dependency-light.
//!
//! ## Notes
//!
//! - **No IO**, no global state: only constants and plain data carriers.
//! - `CommandResult` is the common currency for anything that "ran": shell commands, container execs, HTTP requests,
//!   background processes and synthetic log snapshots.

pub mod constants;
pub mod result;
pub mod testcase_results;

pub use result::CommandResult;
pub use testcase_results::{TestCaseResults, TestStatus};
