//! Harness configuration.
//!
//! Settings come from the `ITKIT_TEST_*` environment variables and are overridden by runner flags. They are passed
//! explicitly to every test case; child processes receive them through `env_pairs()` rather than by mutating the
//! harness's own environment.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use itkit_core::constants::{ITKIT_CAPTURE, ITKIT_JOB_ID, ITKIT_KNOWN_ISSUES, ITKIT_PRINT_COMMANDS, ITKIT_PRINT_OUTPUT};

/// When captured command output is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureScheme {
    /// Every test.
    All,
    /// Successful tests, plus failures.
    Success,
    /// Failed tests only.
    #[default]
    Failure,
    /// Never.
    None,
}

impl CaptureScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureScheme::All => "all",
            CaptureScheme::Success => "success",
            CaptureScheme::Failure => "failure",
            CaptureScheme::None => "none",
        }
    }

    /// Whether a test that ended with `success` should have its capture data written.
    pub fn should_write(self, success: bool) -> bool {
        match self {
            CaptureScheme::All | CaptureScheme::Success => true,
            CaptureScheme::Failure => !success,
            CaptureScheme::None => false,
        }
    }
}

impl fmt::Display for CaptureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(CaptureScheme::All),
            "success" => Ok(CaptureScheme::Success),
            "failure" => Ok(CaptureScheme::Failure),
            "none" => Ok(CaptureScheme::None),
            other => Err(format!("unknown capture scheme '{other}' (expected all, success, failure or none)")),
        }
    }
}

/// Resolved harness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub print_commands: bool,
    pub print_output: bool,
    pub capture: CaptureScheme,
    /// Suffix for resource names so concurrent jobs do not collide.
    pub job_id: Option<String>,
    /// Run tests marked as known issues instead of skipping them.
    pub known_issues: bool,
    /// Directory for capture logs.
    pub capture_dir: PathBuf,
    /// Extra variables set by a runner's user arguments; exported to children and readable through `var()`.
    pub vars: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            print_commands: false,
            print_output: false,
            capture: CaptureScheme::default(),
            job_id: None,
            known_issues: false,
            capture_dir: PathBuf::from("."),
            vars: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let capture = match lookup(ITKIT_CAPTURE) {
            Some(value) => value.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}: {}; using the default", ITKIT_CAPTURE, e);
                CaptureScheme::default()
            }),
            None => CaptureScheme::default(),
        };

        Self {
            print_commands: flag(lookup(ITKIT_PRINT_COMMANDS)),
            print_output: flag(lookup(ITKIT_PRINT_OUTPUT)),
            capture,
            job_id: lookup(ITKIT_JOB_ID).filter(|s| !s.is_empty()),
            known_issues: lookup(ITKIT_KNOWN_ISSUES).is_some_and(|s| !s.is_empty() && s != "0"),
            capture_dir: PathBuf::from("."),
            vars: BTreeMap::new(),
        }
    }

    pub fn with_print_commands(mut self, on: bool) -> Self {
        self.print_commands = on;
        self
    }

    pub fn with_print_output(mut self, on: bool) -> Self {
        self.print_output = on;
        self
    }

    pub fn with_capture(mut self, capture: CaptureScheme) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = dir.into();
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_var(name, value);
        self
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// A user variable, falling back to the process environment.
    pub fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned().or_else(|| env::var(name).ok())
    }

    /// Settings as `ITKIT_TEST_*` pairs plus the user variables, for exporting to child processes.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (ITKIT_PRINT_COMMANDS.to_string(), u8::from(self.print_commands).to_string()),
            (ITKIT_PRINT_OUTPUT.to_string(), u8::from(self.print_output).to_string()),
            (ITKIT_CAPTURE.to_string(), self.capture.to_string()),
        ];
        if let Some(job_id) = &self.job_id {
            pairs.push((ITKIT_JOB_ID.to_string(), job_id.clone()));
        }
        if self.known_issues {
            pairs.push((ITKIT_KNOWN_ISSUES.to_string(), "1".to_string()));
        }
        pairs.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }

    /// Log file name for a test's captured command output.
    pub fn capture_filename(&self, test_name: &str) -> String {
        match &self.job_id {
            Some(job_id) => format!("{test_name}_commands_{job_id}.log"),
            None => format!("{test_name}_commands.log"),
        }
    }
}

/// Explicit per-object print setting wins over the settings-wide one.
pub fn resolve_print(explicit: Option<bool>, default: bool) -> bool {
    explicit.unwrap_or(default)
}

fn flag(value: Option<String>) -> bool {
    value.and_then(|v| v.trim().parse::<i64>().ok()).is_some_and(|n| n != 0)
}
