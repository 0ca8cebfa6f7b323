//! Integration test runner.
//!
//! Suites are registered explicitly with `IntegrationTestRunner::suite`, then `run` parses the command line, selects
//! tests, runs each one against a fresh `IntegrationTestCase`, and feeds the results to the reporters.
//!
//! ## Modules
//!
//! - `args` - `RunnerArgs`, the `UserArgs` extension point and the combined `RunnerCli`
//! - `filter` - file-pattern and name-based selection
//! - `reporter` - the `TestReporter` trait, the console reporter and the result collector
//! - `suite` - `TestSuite`, `TestDef` and markers
//!
//! ## Outcomes
//!
//! | Test body ends with          | Status    |
//! |------------------------------|-----------|
//! | `Ok(())`                     | success   |
//! | panic, `HarnessError::Failed` | failure   |
//! | `HarnessError::Skipped`       | skipped   |
//! | any other `Err`              | error     |
//!
//! The process exit code is `+1` when any test errored and `+2` when any failed, or 3 when nothing matched.

pub mod args;
pub mod filter;
pub mod reporter;
pub mod suite;

pub use args::{NoUserArgs, RunnerArgs, RunnerCli, UserArgs};
pub use filter::TestFilter;
pub use reporter::{ConsoleReporter, ResultCollector, TestReporter, TestSummary};
pub use suite::{TestDef, TestMarker, TestSuite};

use std::any::Any;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use clap::{CommandFactory, FromArgMatches};
use itkit_core::{TestCaseResults, TestStatus};

use crate::container::ContainerRuntime;
use crate::errors::{HarnessError, HarnessResult};
use crate::logging;
use crate::reports;
use crate::settings::Settings;
use crate::testcase::IntegrationTestCase;

/// Exit code when no registered test matches the filters.
pub const NO_TESTS_EXIT_CODE: i32 = 3;

/// A registered test chosen for this run.
#[derive(Debug, Clone, Copy)]
pub struct SelectedTest<'a> {
    pub suite: &'a TestSuite,
    pub def: &'a TestDef,
}

pub struct IntegrationTestRunner<U: UserArgs = NoUserArgs> {
    description: String,
    suites: Vec<TestSuite>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    settings: Option<Settings>,
    reporters: Vec<Box<dyn TestReporter>>,
    _user: PhantomData<fn() -> U>,
}

impl<U: UserArgs> IntegrationTestRunner<U> {
    /// `description` becomes the `--help` text.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            suites: Vec::new(),
            runtime: None,
            settings: None,
            reporters: Vec::new(),
            _user: PhantomData,
        }
    }

    pub fn suite(mut self, suite: TestSuite) -> Self {
        self.add_suite(suite);
        self
    }

    pub fn add_suite(&mut self, suite: TestSuite) {
        self.suites.push(suite);
    }

    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    /// Hand `runtime` to every test case instead of letting each connect to Docker.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Start from `settings` instead of the `ITKIT_TEST_*` environment.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Also report to `reporter`, after the console.
    pub fn with_reporter(mut self, reporter: Box<dyn TestReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn parse_args<I, T>(&self, args: I) -> Result<RunnerCli<U>, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = RunnerCli::<U>::command()
            .about(self.description.clone())
            .try_get_matches_from(args)?;
        RunnerCli::<U>::from_arg_matches(&matches)
    }

    /// Tests that pass the file and name filters, in registration order, and the filters that were applied.
    pub fn find_tests(&self, args: &RunnerArgs) -> (Vec<SelectedTest<'_>>, Vec<String>) {
        let filter = TestFilter::from_args(args);
        let mut selected = Vec::new();
        for suite in self.suites.iter().filter(|s| filter.matches_file(s.file_name())) {
            for def in suite.tests().iter().filter(|d| filter.matches(&d.name)) {
                selected.push(SelectedTest { suite, def });
            }
        }
        (selected, filter.descriptions())
    }

    /// Run `std::env::args_os()`.
    pub fn run_from_env(&mut self) -> i32 {
        self.run(std::env::args_os())
    }

    /// Parse `args` (program name first), run the selected tests and return the exit code.
    pub fn run<I, T>(&mut self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        logging::init("warn");

        let cli = match self.parse_args(args) {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                return e.exit_code();
            }
        };

        let mut extra = mem::take(&mut self.reporters);
        let code = self.run_parsed(cli, &mut extra);
        self.reporters = extra;
        code
    }

    #[tracing::instrument(skip_all)]
    fn run_parsed(&self, cli: RunnerCli<U>, extra: &mut [Box<dyn TestReporter>]) -> i32 {
        let args = cli.runner;
        let base = self.settings.clone().unwrap_or_else(Settings::from_env);
        let mut settings = args.setup_environment(base);
        if let Err(e) = cli.user.process_user_args(&mut settings) {
            eprintln!("error: {e}");
            return 2;
        }

        let (selected, applied) = self.find_tests(&args);
        if selected.is_empty() {
            println!("No tests matching:\n\t{}", applied.join("\n\t"));
            return NO_TESTS_EXIT_CODE;
        }
        if args.list {
            for test in &selected {
                println!("{}", test.def.name);
            }
            return 0;
        }

        let mut console = ConsoleReporter::new(args.verbosity);
        let mut collector = ResultCollector::default();
        let summary = {
            let mut reporters: Vec<&mut dyn TestReporter> = vec![&mut console, &mut collector];
            reporters.extend(extra.iter_mut().map(|r| &mut **r as &mut dyn TestReporter));
            let mut fanout = Fanout(reporters);
            self.execute(&selected, &settings, args.stop_early(), &mut fanout)
        };

        if args.reports {
            reports::write_reports(collector.results());
            match reports::write_json_report(collector.results(), &args.report_dir) {
                Ok(path) => tracing::info!(path = %path.display(), "report written"),
                Err(e) => tracing::warn!("Failed to write the JSON report: {}", e),
            }
        }
        summary.exit_code()
    }

    /// Run `selected` in order, reporting each test; with `stop_early`, stop after the first failure or error.
    #[tracing::instrument(skip_all, fields(tests = selected.len()))]
    pub fn execute(
        &self,
        selected: &[SelectedTest<'_>],
        settings: &Settings,
        stop_early: bool,
        reporter: &mut dyn TestReporter,
    ) -> TestSummary {
        let start = Instant::now();
        let mut results = Vec::with_capacity(selected.len());
        reporter.on_collection_complete(selected.len());

        for test in selected {
            let mut record = TestCaseResults::new(&test.def.name, test.suite.classname(), test.suite.file(), test.def.line);
            record.started_at = Some(Local::now());
            reporter.on_test_start(&record);

            let (status, message) = match test.def.skip_reason(settings.known_issues) {
                Some(reason) => (TestStatus::Skipped, Some(reason)),
                None => self.run_case(test, settings),
            };
            record.status = Some(status);
            record.message = message;
            record.ended_at = Some(Local::now());
            tracing::debug!(test = %record.testname, %status, "test finished");
            reporter.on_test_complete(&record);
            results.push(record);

            if stop_early && matches!(status, TestStatus::Failure | TestStatus::Error) {
                tracing::info!("stopping after the first unsuccessful test");
                break;
            }
        }

        let summary = TestSummary::from_results(&results, start.elapsed());
        reporter.on_run_complete(&summary);
        summary
    }

    fn run_case(&self, test: &SelectedTest<'_>, settings: &Settings) -> (TestStatus, Option<String>) {
        let mut case = IntegrationTestCase::new(&test.def.name, settings.clone());
        if let Some(runtime) = &self.runtime {
            case = case.with_runtime(Arc::clone(runtime));
        }
        case.set_up();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            test.suite.run_set_up(&mut case)?;
            test.def.call(&mut case)
        }));
        let (status, message) = classify(outcome);
        case.tear_down(matches!(status, TestStatus::Success | TestStatus::Skipped));
        (status, message)
    }
}

fn classify(outcome: std::thread::Result<HarnessResult<()>>) -> (TestStatus, Option<String>) {
    match outcome {
        Ok(Ok(())) => (TestStatus::Success, None),
        Ok(Err(HarnessError::Skipped(reason))) => (TestStatus::Skipped, Some(reason)),
        Ok(Err(HarnessError::Failed(message))) => (TestStatus::Failure, Some(message)),
        Ok(Err(e)) => (TestStatus::Error, Some(e.to_string())),
        Err(payload) => (TestStatus::Failure, Some(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_string()
    }
}

/// Forwards every event to each reporter in turn.
struct Fanout<'a>(Vec<&'a mut dyn TestReporter>);

impl TestReporter for Fanout<'_> {
    fn on_collection_complete(&mut self, test_count: usize) {
        for reporter in self.0.iter_mut() {
            reporter.on_collection_complete(test_count);
        }
    }

    fn on_test_start(&mut self, test: &TestCaseResults) {
        for reporter in self.0.iter_mut() {
            reporter.on_test_start(test);
        }
    }

    fn on_test_complete(&mut self, test: &TestCaseResults) {
        for reporter in self.0.iter_mut() {
            reporter.on_test_complete(test);
        }
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        for reporter in self.0.iter_mut() {
            reporter.on_run_complete(summary);
        }
    }
}
