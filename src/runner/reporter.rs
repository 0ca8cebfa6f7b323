//! Reporting test progress and results.
//!
//! The runner talks to reporters only through `TestReporter`, so console output, result collection and any custom
//! format are interchangeable.

use std::time::Duration;

use itkit_core::{TestCaseResults, TestStatus};

// ============================================================================
// Test Reporter Trait
// ============================================================================

pub trait TestReporter {
    /// Called once the selection is known, before any test runs.
    fn on_collection_complete(&mut self, _test_count: usize) {}

    /// Called with the start time already recorded.
    fn on_test_start(&mut self, test: &TestCaseResults);

    /// Called with status, message and end time recorded.
    fn on_test_complete(&mut self, test: &TestCaseResults);

    fn on_run_complete(&mut self, summary: &TestSummary);
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub duration: Duration,
}

impl TestSummary {
    pub fn from_results(results: &[TestCaseResults], duration: Duration) -> Self {
        let count = |status| results.iter().filter(|r| r.is(status)).count();
        Self {
            total: results.len(),
            passed: count(TestStatus::Success),
            failed: count(TestStatus::Failure),
            errors: count(TestStatus::Error),
            skipped: count(TestStatus::Skipped),
            duration,
        }
    }

    pub fn was_successful(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    /// `+1` when anything errored, `+2` when anything failed.
    pub fn exit_code(&self) -> i32 {
        let mut code = 0;
        if self.errors > 0 {
            code += 1;
        }
        if self.failed > 0 {
            code += 2;
        }
        code
    }
}

// ============================================================================
// Console
// ============================================================================

/// Progress on stdout. Verbosity 0 prints only the summary, 1 a character per test, 2 and up a line per test.
pub struct ConsoleReporter {
    verbosity: u8,
    problems: Vec<TestCaseResults>,
}

impl ConsoleReporter {
    pub fn new(verbosity: u8) -> Self {
        Self {
            verbosity,
            problems: Vec::new(),
        }
    }

    fn status_text(&self, test: &TestCaseResults) -> String {
        let status = test.status.unwrap_or(TestStatus::Error);
        if self.verbosity < 2 {
            return match status {
                TestStatus::Success => "\x1b[32m.\x1b[0m".to_string(),
                TestStatus::Failure => "\x1b[31mF\x1b[0m".to_string(),
                TestStatus::Error => "\x1b[31mE\x1b[0m".to_string(),
                TestStatus::Skipped => "\x1b[33ms\x1b[0m".to_string(),
            };
        }
        match status {
            TestStatus::Success => format!("\x1b[32mok\x1b[0m ({:.0}ms)", test.duration().as_millis()),
            TestStatus::Failure => "\x1b[31mFAIL\x1b[0m".to_string(),
            TestStatus::Error => "\x1b[31mERROR\x1b[0m".to_string(),
            TestStatus::Skipped => match test.message.as_deref() {
                Some(reason) if !reason.is_empty() => format!("\x1b[33mskipped\x1b[0m '{reason}'"),
                _ => "\x1b[33mskipped\x1b[0m".to_string(),
            },
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TestReporter for ConsoleReporter {
    fn on_collection_complete(&mut self, test_count: usize) {
        if self.verbosity > 2 {
            println!("Running {test_count} tests");
        }
    }

    fn on_test_start(&mut self, test: &TestCaseResults) {
        if self.verbosity >= 2 {
            print!("{} ({}) ... ", test.testname, test.classname);
        }
    }

    fn on_test_complete(&mut self, test: &TestCaseResults) {
        if matches!(test.status, Some(TestStatus::Failure | TestStatus::Error)) {
            self.problems.push(test.clone());
        }
        match self.verbosity {
            0 => {}
            1 => print!("{}", self.status_text(test)),
            _ => println!("{}", self.status_text(test)),
        }
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        if self.verbosity == 1 {
            println!();
        }

        for test in &self.problems {
            let label = if test.is(TestStatus::Failure) { "FAIL" } else { "ERROR" };
            println!("{}", "=".repeat(70));
            println!("\x1b[31m{label}\x1b[0m: {} ({})", test.testname, test.classname);
            println!("{}", "-".repeat(70));
            println!("{}", test.message.as_deref().unwrap_or_default());
        }

        println!("{}", "-".repeat(70));
        println!("Ran {} tests in {:.3}s", summary.total, summary.duration.as_secs_f64());
        println!();

        let mut parts = Vec::new();
        if summary.failed > 0 {
            parts.push(format!("failures={}", summary.failed));
        }
        if summary.errors > 0 {
            parts.push(format!("errors={}", summary.errors));
        }
        if summary.skipped > 0 {
            parts.push(format!("skipped={}", summary.skipped));
        }
        let verdict = if summary.was_successful() { "\x1b[32mOK\x1b[0m" } else { "\x1b[31mFAILED\x1b[0m" };
        if parts.is_empty() {
            println!("{verdict}");
        } else {
            println!("{verdict} ({})", parts.join(", "));
        }
    }
}

// ============================================================================
// Collection
// ============================================================================

/// Keeps every finished test's data, in completion order.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Vec<TestCaseResults>,
}

impl ResultCollector {
    pub fn results(&self) -> &[TestCaseResults] {
        &self.results
    }

    pub fn into_results(self) -> Vec<TestCaseResults> {
        self.results
    }
}

impl TestReporter for ResultCollector {
    fn on_test_start(&mut self, _test: &TestCaseResults) {}

    fn on_test_complete(&mut self, test: &TestCaseResults) {
        self.results.push(test.clone());
    }

    fn on_run_complete(&mut self, _summary: &TestSummary) {}
}
