//! Per-test bookkeeping fed to the report writer.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Final status of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failure,
    Error,
    Skipped,
}

impl TestStatus {
    /// Tag name used in reports.
    pub fn tag(self) -> &'static str {
        match self {
            TestStatus::Success => "success",
            TestStatus::Failure => "failure",
            TestStatus::Error => "error",
            TestStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What the runner learned about one test.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseResults {
    pub testname: String,
    pub classname: String,
    pub filename: String,
    pub line: u32,
    pub status: Option<TestStatus>,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
}

impl TestCaseResults {
    pub fn new(
        testname: impl Into<String>,
        classname: impl Into<String>,
        filename: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            testname: testname.into(),
            classname: classname.into(),
            filename: filename.into(),
            line,
            status: None,
            message: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Wall time between start and end; zero until both are recorded.
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    pub fn is(&self, status: TestStatus) -> bool {
        self.status == Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_tags() {
        assert_eq!(TestStatus::Success.tag(), "success");
        assert_eq!(TestStatus::Failure.tag(), "failure");
        assert_eq!(TestStatus::Error.tag(), "error");
        assert_eq!(TestStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_duration_requires_both_timestamps() {
        let mut data = TestCaseResults::new("test_a", "suite.Basic", "tests/basic.rs", 12);
        assert_eq!(data.duration(), Duration::ZERO);

        let start = Local::now();
        data.started_at = Some(start);
        assert_eq!(data.duration(), Duration::ZERO);

        data.ended_at = Some(start + TimeDelta::milliseconds(1500));
        assert_eq!(data.duration(), Duration::from_millis(1500));
    }

    #[test]
    fn test_negative_duration_clamps_to_zero() {
        let mut data = TestCaseResults::new("test_a", "suite.Basic", "tests/basic.rs", 12);
        let start = Local::now();
        data.started_at = Some(start);
        data.ended_at = Some(start - TimeDelta::seconds(1));
        assert_eq!(data.duration(), Duration::ZERO);
    }
}
