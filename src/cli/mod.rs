//! CLI module for the `itkit` binary
//!
//! ## Commands
//!
//! - `cleanup` - Remove stray test containers
//! - `serve --responses <file>` - Run a mock HTTP server from a JSON response table
//! - `last-built <base>` - Print the newest local image tag containing a string
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::cleanup::CleanupArgs;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    pub const USAGE: ExitCode = ExitCode(2);
}

/// A user-facing message and the exit code to leave with.
#[derive(Debug)]
pub struct CliError {
    /// Already formatted for display
    pub message: String,
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Exit code 1.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::HarnessError> for CliError {
    fn from(e: crate::errors::HarnessError) -> Self {
        CliError::failure(format!("Error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Integration test harness utilities
#[derive(Parser, Debug)]
#[command(name = "itkit")]
#[command(version = VERSION)]
#[command(about = "Integration test harness utilities", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove stray integration test containers
    Cleanup {
        #[command(flatten)]
        args: CleanupArgs,
    },

    /// Serve a JSON response table until interrupted
    Serve {
        /// Response table (path -> method -> response)
        #[arg(long, value_name = "FILE")]
        responses: PathBuf,
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on (0 picks a free one)
        #[arg(long, default_value_t = 0)]
        port: u16,
    },

    /// Print the newest local image tag containing BASE
    LastBuilt {
        #[arg(value_name = "BASE")]
        base: String,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Cleanup { args } => commands::cleanup(&args),
        Command::Serve { responses, host, port } => commands::serve(&responses, &host, port),
        Command::LastBuilt { base } => commands::last_built(&base),
    }
}

// ============================================================================
// Tests
// ============================================================================
