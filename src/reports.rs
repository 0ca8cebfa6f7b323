//! Per-suite test reports.
//!
//! Results are grouped by class name in order of first appearance. The text form is one `Suite:` line per group
//! followed by an indented `Case:` line per test; `report.json` carries the same data.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use itkit_core::{TestCaseResults, TestStatus};
use serde::Serialize;

use crate::errors::HarnessResult;

pub const JSON_REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub tests: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: usize,
    pub success: usize,
    pub filename: String,
    pub cases: Vec<CaseReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub line: u32,
    pub timestamp: String,
    /// Seconds.
    pub time: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// ISO 8601 local time; the fraction is left out when there are no whole microseconds.
fn timestamp(at: Option<DateTime<Local>>) -> String {
    at.map(|t| {
        let format = if t.timestamp_subsec_micros() == 0 { "%Y-%m-%dT%H:%M:%S" } else { "%Y-%m-%dT%H:%M:%S%.6f" };
        t.format(format).to_string()
    })
    .unwrap_or_default()
}

/// Shortest round-trip text for `value`, always with a fraction or an exponent (`2.0`, `0.25`, `5e-05`).
fn float_text(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 || (1e-4..1e16).contains(&value.abs()) {
        let text = value.to_string();
        return if text.contains('.') { text } else { format!("{text}.0") };
    }
    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// Group results into suites.
pub fn build_reports(results: &[TestCaseResults]) -> Vec<SuiteReport> {
    let mut suites: Vec<SuiteReport> = Vec::new();
    for item in results {
        let index = match suites.iter().position(|s| s.name == item.classname) {
            Some(index) => index,
            None => {
                suites.push(SuiteReport {
                    name: item.classname.clone(),
                    tests: 0,
                    failures: 0,
                    errors: 0,
                    skipped: 0,
                    success: 0,
                    filename: item.filename.clone(),
                    cases: Vec::new(),
                });
                suites.len() - 1
            }
        };
        let suite = &mut suites[index];

        suite.tests += 1;
        match item.status {
            Some(TestStatus::Success) => suite.success += 1,
            Some(TestStatus::Failure) => suite.failures += 1,
            Some(TestStatus::Error) => suite.errors += 1,
            Some(TestStatus::Skipped) => suite.skipped += 1,
            None => {}
        }
        suite.cases.push(CaseReport {
            name: item.testname.clone(),
            line: item.line,
            timestamp: timestamp(item.started_at),
            time: item.duration().as_secs_f64(),
            status: item.status.map(TestStatus::tag).unwrap_or("unknown").to_string(),
            message: item.message.clone(),
        });
    }
    suites
}

/// The text report, one line per suite and per case.
pub fn report_lines(results: &[TestCaseResults]) -> Vec<String> {
    let mut lines = Vec::new();
    for suite in build_reports(results) {
        lines.push(format!(
            "Suite: name={} tests={} failures={} errors={} skipped={} success={} filename={}",
            suite.name, suite.tests, suite.failures, suite.errors, suite.skipped, suite.success, suite.filename
        ));
        for case in &suite.cases {
            lines.push(format!(
                "    Case: name={} line={} timestamp={} time={} status={}",
                case.name,
                case.line,
                case.timestamp,
                float_text(case.time),
                case.status
            ));
        }
    }
    lines
}

/// Print the text report.
pub fn write_reports(results: &[TestCaseResults]) {
    for line in report_lines(results) {
        println!("{line}");
    }
}

/// Write `report.json` into `dir`, creating it if needed.
pub fn write_json_report(results: &[TestCaseResults], dir: &Path) -> HarnessResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(JSON_REPORT_FILE);
    let body = serde_json::json!({ "suites": build_reports(results) });
    fs::write(&path, serde_json::to_string_pretty(&body)?)?;
    tracing::debug!(path = %path.display(), "wrote JSON report");
    Ok(path)
}
