//! Command-line arguments shared by every integration test runner.

use std::path::PathBuf;

use clap::{Args, FromArgMatches, Parser};

use crate::errors::HarnessResult;
use crate::settings::{CaptureScheme, Settings};

/// Runner flags. Print and capture flags override the `ITKIT_TEST_*` environment.
#[derive(Debug, Clone, Args)]
pub struct RunnerArgs {
    /// Same as --failfast
    #[arg(long)]
    pub debug: bool,

    /// Stop at the first failure or error
    #[arg(long)]
    pub failfast: bool,

    /// Output verbosity
    #[arg(short = 'v', long = "verbosity", value_name = "LEVEL", default_value_t = 3)]
    pub verbosity: u8,

    /// Print every command before running it
    #[arg(long, visible_alias = "pc")]
    pub print_commands: bool,

    /// Print the output of every command
    #[arg(long, visible_alias = "po")]
    pub print_output: bool,

    /// Print commands and their output
    #[arg(long, visible_alias = "pa")]
    pub print_all: bool,

    /// When to write captured command output [default: failure]
    #[arg(short = 'c', long, value_name = "SCHEME", value_parser = parse_capture)]
    pub capture: Option<CaptureScheme>,

    /// Print a report and write report.json
    #[arg(short = 'r', long)]
    pub reports: bool,

    /// Directory for report.json
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub report_dir: PathBuf,

    /// Only suites whose file name matches this pattern (`*` and `?` wildcards)
    #[arg(long, value_name = "PATTERN", default_value = "test_*")]
    pub file: String,

    /// Only tests whose name contains one of these strings
    #[arg(short = 'f', long = "filter", value_name = "S", num_args = 1..)]
    pub filter: Vec<String>,

    /// Only tests whose name sorts at or before this string
    #[arg(long, value_name = "S")]
    pub before: Option<String>,

    /// Only tests whose name sorts at or after this string
    #[arg(long, value_name = "S")]
    pub after: Option<String>,

    /// Skip tests whose name contains one of these strings
    #[arg(long, value_name = "S", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Run tests marked as known issues
    #[arg(long)]
    pub known_issues: bool,

    /// List the selected tests instead of running them
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Suffix for resource names, so concurrent jobs do not collide
    #[arg(long, value_name = "ID")]
    pub job_id: Option<String>,
}

fn parse_capture(value: &str) -> Result<CaptureScheme, String> {
    value.parse()
}

impl RunnerArgs {
    pub fn stop_early(&self) -> bool {
        self.debug || self.failfast
    }

    /// Resolve settings: flags win over `base`, and `--print-all` turns on both print flags.
    pub fn setup_environment(&self, base: Settings) -> Settings {
        let mut settings = base;
        settings.print_commands |= self.print_commands || self.print_all;
        settings.print_output |= self.print_output || self.print_all;
        if let Some(capture) = self.capture {
            settings.capture = capture;
        }
        if let Some(job_id) = self.job_id.as_ref().filter(|id| !id.is_empty()) {
            settings.job_id = Some(job_id.clone());
        }
        settings.known_issues |= self.known_issues;
        settings
    }
}

/// Extra arguments a downstream runner adds to the standard ones.
pub trait UserArgs: Args + FromArgMatches {
    /// Apply the parsed arguments, usually by setting variables the tests read through `Settings::var`.
    fn process_user_args(&self, _settings: &mut Settings) -> HarnessResult<()> {
        Ok(())
    }
}

/// For runners without extra arguments.
#[derive(Debug, Clone, Default, Args)]
pub struct NoUserArgs {}

impl UserArgs for NoUserArgs {}

/// Full command line: runner flags plus the user's.
#[derive(Debug, Parser)]
pub struct RunnerCli<U: UserArgs> {
    #[command(flatten)]
    pub runner: RunnerArgs,

    #[command(flatten)]
    pub user: U,
}
