//! Output record for anything the harness runs.

use std::time::Duration;

/// Captured outcome of a command.
///
/// Output is kept as lines so assertions can look for individual lines without re-splitting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub return_value: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub elapsed: Duration,
    pub command: Option<String>,
}

impl CommandResult {
    pub fn new(command: impl Into<String>, return_value: i32, elapsed: Duration) -> Self {
        Self {
            return_value,
            command: Some(command.into()),
            elapsed,
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, stdout: Vec<String>) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: Vec<String>) -> Self {
        self.stderr = stderr;
        self
    }

    /// Standard output as a single string.
    pub fn out(&self) -> String {
        self.stdout.join("\n")
    }

    /// Standard error as a single string.
    pub fn err(&self) -> String {
        self.stderr.join("\n")
    }

    /// Return the first stdout line containing `needle`.
    pub fn out_contains(&self, needle: &str) -> Option<&str> {
        self.stdout.iter().find(|line| line.contains(needle)).map(String::as_str)
    }

    /// Both streams, stdout first.
    pub fn all(&self) -> String {
        format!("{}\n{}", self.out(), self.err())
    }

    pub fn succeeded(&self) -> bool {
        self.return_value == 0
    }
}

/// Decode raw process output into lines.
///
/// Invalid UTF-8 is replaced rather than rejected and carriage returns are dropped, so output from Windows tools
/// compares the same as Unix output. A trailing newline yields a trailing empty line, matching `str::split`.
pub fn split_output(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .replace('\r', "")
        .split('\n')
        .map(str::to_string)
        .collect()
}
