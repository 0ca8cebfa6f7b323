//! End-to-end runner behaviour against the in-memory container runtime.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use itkit::runner::{TestReporter, TestSummary};
use itkit::{
    CaptureScheme, Container, ContainerFixture, ContainerSpec, FakeRuntime, HarnessError, HarnessResult,
    IntegrationTestCase, IntegrationTestRunner, NoUserArgs, PollConfig, Settings, TestCaseResults, TestSuite,
};
use serial_test::serial;

fn fast_poll() -> PollConfig {
    PollConfig::default()
        .with_max_wait(Duration::from_secs(2))
        .with_start_poll(Duration::from_millis(1))
        .with_min_poll(Duration::from_millis(1))
        .with_max_poll(Duration::from_millis(5))
}

fn database_suite() -> TestSuite {
    TestSuite::new("db.TestDatabase", "tests/test_db.rs")
        .set_up(|case| {
            let runtime = case.runtime()?;
            let spec = ContainerSpec::new(case.full_name("db"), "postgres:16");
            let db = Container::new("Database", spec, runtime).with_settings(case.settings());
            case.start_container(db)?;
            case.wait_for_ready(&[], fast_poll(), None)
        })
        .test("test_query", 10, |case| {
            let result = case
                .get_container("db")
                .ok_or_else(|| HarnessError::Failed("db is not registered".into()))?
                .container()
                .shell_cmd("psql -c 'select 1'")?;
            case.log_result(&result);
            assert!(result.out().starts_with('1'));
            Ok(())
        })
}

fn engine() -> FakeRuntime {
    let fake = FakeRuntime::new().with_image("postgres:16", 1);
    fake.set_ready_after(2);
    fake.set_exec_output(0, "1\n");
    fake
}

fn quiet_runner(fake: &FakeRuntime, settings: Settings) -> IntegrationTestRunner<NoUserArgs> {
    IntegrationTestRunner::new("database tests")
        .with_runtime(Arc::new(fake.clone()))
        .with_settings(settings)
}

#[test]
fn test_container_lifecycle_through_runner() {
    let fake = engine();
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_job_id("t1").with_capture_dir(dir.path());
    let mut runner = quiet_runner(&fake, settings).suite(database_suite());

    assert_eq!(runner.run(["db", "-v", "0"]), 0);
    assert_eq!(
        fake.operations(),
        vec!["run db-t1", "exec db-t1: psql -c select 1", "kill db-t1"]
    );
    assert!(fake.container_names().is_empty());
    // success with the default capture scheme writes nothing
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_capture_all_writes_log() {
    let fake = engine();
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_capture_dir(dir.path());
    let mut runner = quiet_runner(&fake, settings).suite(database_suite());

    assert_eq!(runner.run(["db", "-v", "0", "--capture", "all"]), 0);
    let log = fs::read_to_string(dir.path().join("test_query_commands.log")).unwrap();
    assert!(log.contains("Command: db exec: psql -c 'select 1'"));
    assert!(log.contains("Return: 0"));
}

#[cfg(unix)]
#[test]
fn test_failure_captures_shell_commands() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_capture_dir(dir.path());
    let mut runner = quiet_runner(&FakeRuntime::new(), settings).suite(
        TestSuite::new("shell.TestShell", "tests/test_shell.rs").test("test_echo", 3, |case| {
            let result = case.command("echo hello", &[])?;
            case.assert_result_success(&result, Some("hello"));
            Err(HarnessError::Failed("expected something else".into()))
        }),
    );

    assert_eq!(runner.run(["shell", "-v", "0"]), 2);
    let log = fs::read_to_string(dir.path().join("test_echo_commands.log")).unwrap();
    assert!(log.contains("Command: echo hello"));
    assert!(log.lines().any(|line| line == "hello"));
}

#[test]
fn test_missing_image_is_an_error() {
    let fake = FakeRuntime::new();
    let settings = Settings::default().with_capture(CaptureScheme::None);
    let mut runner = quiet_runner(&fake, settings).suite(database_suite());

    assert_eq!(runner.run(["db", "-v", "0"]), 1);
    assert!(fake.operations().is_empty());
}

#[test]
fn test_failfast_stops_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move |_: &mut IntegrationTestCase| -> HarnessResult<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HarnessError::Failed("boom".into()))
        }
    };
    let suite = || {
        TestSuite::new("fail.TestFail", "tests/test_fail.rs")
            .test("test_first", 1, counted(&calls))
            .test("test_second", 2, counted(&calls))
    };
    let settings = Settings::default().with_capture(CaptureScheme::None);

    let mut runner = quiet_runner(&FakeRuntime::new(), settings.clone()).suite(suite());
    assert_eq!(runner.run(["fail", "-v", "0", "--failfast"]), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut runner = quiet_runner(&FakeRuntime::new(), settings).suite(suite());
    assert_eq!(runner.run(["fail", "-v", "0"]), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl TestReporter for Recorder {
    fn on_collection_complete(&mut self, test_count: usize) {
        self.0.lock().unwrap().push(format!("collected {test_count}"));
    }

    fn on_test_start(&mut self, test: &TestCaseResults) {
        self.0.lock().unwrap().push(format!("start {}", test.testname));
    }

    fn on_test_complete(&mut self, test: &TestCaseResults) {
        let status = test.status.map(|s| s.tag()).unwrap_or("none");
        self.0.lock().unwrap().push(format!("done {} {}", test.testname, status));
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        self.0.lock().unwrap().push(format!("finished {}", summary.total));
    }
}

#[test]
fn test_custom_reporter_sees_every_event() {
    let recorder = Recorder::default();
    let settings = Settings::default().with_capture(CaptureScheme::None);
    let mut runner = quiet_runner(&engine(), settings)
        .suite(database_suite())
        .with_reporter(Box::new(recorder.clone()));

    assert_eq!(runner.run(["db", "-v", "0"]), 0);
    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec!["collected 1", "start test_query", "done test_query success", "finished 1"]
    );
}

#[test]
fn test_reports_written_to_report_dir() {
    let dir = tempfile::tempdir().unwrap();
    let report_dir = dir.path().join("reports");
    let settings = Settings::default().with_capture(CaptureScheme::None);
    let mut runner = quiet_runner(&engine(), settings).suite(database_suite());

    let code = runner.run([
        "db",
        "-v",
        "0",
        "-r",
        "--report-dir",
        report_dir.to_str().unwrap(),
    ]);
    assert_eq!(code, 0);
    assert_report(&report_dir.join("report.json"));
}

#[test]
#[serial]
fn test_reports_default_to_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let settings = Settings::default().with_capture(CaptureScheme::None);
    let mut runner = quiet_runner(&engine(), settings).suite(database_suite());
    let code = runner.run(["db", "-v", "0", "--reports"]);

    std::env::set_current_dir(previous).unwrap();
    assert_eq!(code, 0);
    assert_report(&dir.path().join("report.json"));
}

fn assert_report(path: &Path) {
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(value["suites"][0]["name"], "db.TestDatabase");
    assert_eq!(value["suites"][0]["success"], 1);
    assert_eq!(value["suites"][0]["cases"][0]["name"], "test_query");
    assert_eq!(value["suites"][0]["cases"][0]["line"], 10);
}
