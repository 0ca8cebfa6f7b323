//! Test registration.

use std::fmt;

use crate::errors::HarnessResult;
use crate::testcase::IntegrationTestCase;

/// Body of a test, or of a suite's set-up step.
pub type TestFn = Box<dyn Fn(&mut IntegrationTestCase) -> HarnessResult<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestMarker {
    /// Never run.
    Skip(String),
    /// Run only when known issues are enabled.
    KnownIssue(String),
}

impl TestMarker {
    /// Why the test should not run under these settings, if it should not.
    pub fn skip_reason(&self, known_issues: bool) -> Option<String> {
        match self {
            TestMarker::Skip(reason) => Some(reason.clone()),
            TestMarker::KnownIssue(_) if known_issues => None,
            TestMarker::KnownIssue(message) => Some(format!("Known issue: {message}")),
        }
    }
}

/// One registered test.
pub struct TestDef {
    pub name: String,
    /// Source line, reported alongside the result.
    pub line: u32,
    pub markers: Vec<TestMarker>,
    func: TestFn,
}

impl TestDef {
    pub fn new<F>(name: impl Into<String>, line: u32, func: F) -> Self
    where
        F: Fn(&mut IntegrationTestCase) -> HarnessResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            line,
            markers: Vec::new(),
            func: Box::new(func),
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.markers.push(TestMarker::Skip(reason.into()));
        self
    }

    pub fn known_issue(mut self, message: impl Into<String>) -> Self {
        self.markers.push(TestMarker::KnownIssue(message.into()));
        self
    }

    /// The first marker that keeps this test from running.
    pub fn skip_reason(&self, known_issues: bool) -> Option<String> {
        self.markers.iter().find_map(|m| m.skip_reason(known_issues))
    }

    pub fn call(&self, case: &mut IntegrationTestCase) -> HarnessResult<()> {
        (self.func)(case)
    }
}

impl fmt::Debug for TestDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDef")
            .field("name", &self.name)
            .field("line", &self.line)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

/// A group of tests sharing a class name, a source file, and an optional set-up step.
pub struct TestSuite {
    classname: String,
    file: String,
    set_up: Option<TestFn>,
    tests: Vec<TestDef>,
}

impl TestSuite {
    pub fn new(classname: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            file: file.into(),
            set_up: None,
            tests: Vec::new(),
        }
    }

    /// Runs on each fresh test case before the test body.
    pub fn set_up<F>(mut self, func: F) -> Self
    where
        F: Fn(&mut IntegrationTestCase) -> HarnessResult<()> + Send + Sync + 'static,
    {
        self.set_up = Some(Box::new(func));
        self
    }

    pub fn test<F>(self, name: impl Into<String>, line: u32, func: F) -> Self
    where
        F: Fn(&mut IntegrationTestCase) -> HarnessResult<()> + Send + Sync + 'static,
    {
        self.test_with(TestDef::new(name, line, func))
    }

    pub fn test_with(mut self, def: TestDef) -> Self {
        self.tests.push(def);
        self
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Final path component of the registered file.
    pub fn file_name(&self) -> &str {
        self.file.rsplit(['/', '\\']).next().unwrap_or(&self.file)
    }

    pub fn tests(&self) -> &[TestDef] {
        &self.tests
    }

    pub fn run_set_up(&self, case: &mut IntegrationTestCase) -> HarnessResult<()> {
        match &self.set_up {
            Some(func) => func(case),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("classname", &self.classname)
            .field("file", &self.file)
            .field("tests", &self.tests)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HarnessError;
    use crate::settings::Settings;

    fn pass(_: &mut IntegrationTestCase) -> HarnessResult<()> {
        Ok(())
    }

    #[test]
    fn test_markers() {
        let def = TestDef::new("test_flaky", 10, pass).known_issue("ticket 12");
        assert_eq!(def.skip_reason(false).as_deref(), Some("Known issue: ticket 12"));
        assert_eq!(def.skip_reason(true), None);

        let def = TestDef::new("test_off", 11, pass).skip("not on CI").known_issue("ticket 13");
        assert_eq!(def.skip_reason(true).as_deref(), Some("not on CI"));
    }

    #[test]
    fn test_registration_keeps_order() {
        let suite = TestSuite::new("pets.Basic", "tests/it/test_pets.rs")
            .test("test_b", 20, pass)
            .test_with(TestDef::new("test_a", 30, pass));
        let names: Vec<&str> = suite.tests().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["test_b", "test_a"]);
        assert_eq!(suite.file_name(), "test_pets.rs");
        assert_eq!(TestSuite::new("x", "test_plain.rs").file_name(), "test_plain.rs");
    }

    #[test]
    fn test_set_up_and_body_are_callable() {
        let suite = TestSuite::new("pets.Basic", "test_pets.rs")
            .set_up(|_| Err(HarnessError::skip("no docker")))
            .test("test_a", 1, |_| Err(HarnessError::Failed("body".into())));
        let mut case = IntegrationTestCase::new("test_a", Settings::default());
        assert!(matches!(suite.run_set_up(&mut case), Err(HarnessError::Skipped(r)) if r == "no docker"));
        assert!(matches!(suite.tests()[0].call(&mut case), Err(HarnessError::Failed(m)) if m == "body"));
        assert!(TestSuite::new("x", "y").run_set_up(&mut case).is_ok());
    }
}
