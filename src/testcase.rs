//! Per-test fixture: containers, processes, mock servers, commands and their captured output.
//!
//! The runner creates one `IntegrationTestCase` per test, calls `set_up()`, hands it to the suite's set-up function
//! and then to the test, and finally calls `tear_down(success)`. Everything registered with the case is released in
//! `tear_down`, in reverse order of registration.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use itkit_core::CommandResult;
use itkit_core::constants::DEFAULT_REQUEST_TIMEOUT;
use itkit_core::result::split_output;
use itkit_mock::{MockServer, ServerConfig, start_server};
use reqwest::blocking::{Client, Response};
use serde_json::Value;

use crate::container::{ContainerFixture, ContainerRuntime, DockerRuntime};
use crate::errors::{HarnessError, HarnessResult};
use crate::http::{self, LineFilter};
use crate::process::BackgroundProcess;
use crate::readiness::{self, PollConfig, Readiness};
use crate::settings::{CaptureScheme, Settings};
use crate::utils::echo_command;

/// Prefix of the line that starts each logged command in the capture file.
pub const CAPTURE_SEPARATOR: &str = "**************************";

pub struct IntegrationTestCase {
    name: String,
    settings: Settings,
    client: Client,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    request_timeout: Duration,
    capture_data: Vec<String>,
    files: BTreeSet<PathBuf>,
    containers: Vec<Box<dyn ContainerFixture>>,
    processes: Vec<BackgroundProcess>,
    servers: Vec<MockServer>,
}

impl IntegrationTestCase {
    /// `name` is the test name; it names the capture file.
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            settings,
            client: Client::new(),
            runtime: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            capture_data: Vec::new(),
            files: BTreeSet::new(),
            containers: Vec::new(),
            processes: Vec::new(),
            servers: Vec::new(),
        }
    }

    /// Use `runtime` instead of connecting to Docker on first use.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    /// The container engine, connecting to Docker the first time it is needed.
    pub fn runtime(&mut self) -> HarnessResult<Arc<dyn ContainerRuntime>> {
        if let Some(runtime) = &self.runtime {
            return Ok(Arc::clone(runtime));
        }
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
        self.runtime = Some(Arc::clone(&runtime));
        Ok(runtime)
    }

    pub fn set_up(&mut self) {
        self.capture_data.clear();
        self.files.clear();
        self.containers.clear();
        self.processes.clear();
        self.servers.clear();
    }

    /// Persist capture data per the capture scheme, then release every registered resource.
    pub fn tear_down(&mut self, success: bool) {
        if self.settings.capture.should_write(success) {
            self.write_capture_data();
        }

        for file in std::mem::take(&mut self.files) {
            if let Err(e) = fs::remove_file(&file) {
                tracing::warn!("Failed to remove '{}': {}", file.display(), e);
            }
        }

        for mut container in self.containers.drain(..).rev() {
            container.terminate();
        }
        for mut process in self.processes.drain(..).rev() {
            process.terminate();
        }
        for mut server in self.servers.drain(..).rev() {
            if let Err(e) = server.shutdown() {
                tracing::warn!(addr = %server.addr(), "mock server shutdown failed: {}", e);
            }
        }
    }

    pub fn capture_data(&self) -> &[String] {
        &self.capture_data
    }

    pub fn capture_path(&self) -> PathBuf {
        self.settings.capture_dir.join(self.settings.capture_filename(&self.name))
    }

    /// Write the captured command log; failures are logged only.
    pub fn write_capture_data(&self) {
        if self.capture_data.is_empty() {
            return;
        }
        let path = self.capture_path();
        let written = fs::create_dir_all(&self.settings.capture_dir)
            .and_then(|_| fs::write(&path, self.capture_data.join("\n")));
        match written {
            Ok(()) => tracing::debug!(path = %path.display(), "wrote capture data"),
            Err(e) => tracing::warn!("Failed to write captured data to '{}': {}", path.display(), e),
        }
    }

    /// Write a file that is removed again at tear-down.
    pub fn write_file(&mut self, path: impl AsRef<Path>, content: &str) -> HarnessResult<()> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, content)?;
        self.files.insert(path);
        Ok(())
    }

    pub fn delete_file(&mut self, path: impl AsRef<Path>) -> HarnessResult<()> {
        let path = path.as_ref();
        self.files.remove(path);
        fs::remove_file(path)?;
        Ok(())
    }

    /// Register a fixture for termination at tear-down.
    pub fn add_container<T: ContainerFixture>(&mut self, fixture: T) {
        self.containers.push(Box::new(fixture));
    }

    /// Register and start a fixture. It is registered first so a failed start is still cleaned up.
    pub fn start_container<T: ContainerFixture>(&mut self, fixture: T) -> HarnessResult<()> {
        self.containers.push(Box::new(fixture));
        match self.containers.last_mut() {
            Some(fixture) => fixture.start(),
            None => Ok(()),
        }
    }

    /// First fixture whose name contains `partial_name`.
    pub fn get_container(&self, partial_name: &str) -> Option<&dyn ContainerFixture> {
        self.containers
            .iter()
            .find(|c| c.name().contains(partial_name))
            .map(|c| &**c)
    }

    pub fn get_container_mut(&mut self, partial_name: &str) -> Option<&mut (dyn ContainerFixture + 'static)> {
        self.containers
            .iter_mut()
            .find(|c| c.name().contains(partial_name))
            .map(|c| &mut **c)
    }

    /// Registered fixtures of type `T`, in registration order.
    pub fn containers_of<T: ContainerFixture>(&self) -> Vec<&T> {
        self.containers
            .iter()
            .filter_map(|c| c.as_any().downcast_ref::<T>())
            .collect()
    }

    pub fn add_process(&mut self, process: BackgroundProcess) {
        self.processes.push(process);
    }

    /// Register and start a background process with this case's settings.
    pub fn start_process(&mut self, process: BackgroundProcess) -> HarnessResult<()> {
        self.processes.push(process.with_settings(&self.settings));
        match self.processes.last_mut() {
            Some(process) => process.start(),
            None => Ok(()),
        }
    }

    pub fn get_process(&mut self, partial_name: &str) -> Option<&mut BackgroundProcess> {
        self.processes.iter_mut().find(|p| p.name().contains(partial_name))
    }

    /// Start a mock server that is shut down at tear-down.
    pub fn start_mock_server(&mut self, config: ServerConfig) -> HarnessResult<&MockServer> {
        let server = start_server(config)?;
        self.servers.push(server);
        self.servers
            .last()
            .ok_or_else(|| HarnessError::Failed("mock server was not registered".to_string()))
    }

    pub fn mock_servers(&self) -> &[MockServer] {
        &self.servers
    }

    /// `name` with the job id appended, so concurrent jobs get distinct resource names.
    pub fn full_name(&self, name: &str) -> String {
        match &self.settings.job_id {
            Some(job_id) => format!("{name}-{job_id}"),
            None => name.to_string(),
        }
    }

    /// Assert an empty stderr, a zero return value and, if given, `success_msg` in stdout.
    #[track_caller]
    pub fn assert_result_success(&self, result: &CommandResult, success_msg: Option<&str>) {
        // stderr first: it says the most about a failure
        assert_eq!(result.err(), "", "unexpected stderr from {:?}", result.command);
        assert_eq!(result.return_value, 0, "non-zero return from {:?}", result.command);
        if let Some(msg) = success_msg {
            let out = result.out();
            assert!(out.contains(msg), "'{msg}' not found in stdout:\n{out}");
        }
    }

    /// Assert a successful command that warned with `warn_msg`.
    #[track_caller]
    pub fn assert_result_warning(&self, result: &CommandResult, warn_msg: &str) {
        let err = result.err();
        assert!(err.contains(warn_msg), "'{warn_msg}' not found in stderr:\n{err}");
        assert_eq!(result.return_value, 0, "non-zero return from {:?}", result.command);
    }

    /// Assert a failed command whose stderr contains `err_msg`.
    #[track_caller]
    pub fn assert_result_error(&self, result: &CommandResult, err_msg: &str) {
        let err = result.err();
        assert!(err.contains(err_msg), "'{err_msg}' not found in stderr:\n{err}");
        assert_ne!(result.return_value, 0, "expected a non-zero return from {:?}", result.command);
    }

    /// Assert `needle` appears in stdout or stderr.
    #[track_caller]
    pub fn assert_result_in(&self, result: &CommandResult, needle: &str) {
        let all = result.all();
        assert!(all.contains(needle), "'{needle}' not found in output:\n{all}");
    }

    /// Append a result to the capture data. Nothing is written until tear-down.
    pub fn log_result(&mut self, result: &CommandResult) {
        self.capture_data.push(format!(
            "{} Command: {}",
            CAPTURE_SEPARATOR,
            result.command.as_deref().unwrap_or_default()
        ));
        self.capture_data.push(format!("Return: {}", result.return_value));
        if !result.elapsed.is_zero() {
            self.capture_data.push(format!("Time: {}", result.elapsed.as_secs_f64()));
        }
        self.capture_data.extend(result.stdout.iter().cloned());
        self.capture_data.extend(result.stderr.iter().cloned());
        if self.capture_data.last().is_some_and(|line| !line.is_empty()) {
            self.capture_data.push(String::new());
        }
    }

    /// Run `cmd` through the platform shell, echo per settings, and log the result.
    ///
    /// `env` adds to the inherited environment, which also carries the `ITKIT_TEST_*` settings.
    pub fn command(&mut self, cmd: &str, env: &[(&str, &str)]) -> HarnessResult<CommandResult> {
        let cmd = shell_text(cmd);
        echo_command(self.settings.print_commands, &cmd);

        let start = Instant::now();
        let output = shell(&cmd)
            .envs(self.settings.env_pairs())
            .envs(env.iter().copied())
            .output()
            .map_err(|e| HarnessError::Process {
                name: cmd.clone(),
                message: e.to_string(),
            })?;
        let elapsed = start.elapsed();

        let result = CommandResult::new(cmd, output.status.code().unwrap_or(-1), elapsed)
            .with_stdout(split_output(&output.stdout))
            .with_stderr(split_output(&output.stderr));

        if self.settings.print_output {
            if !result.stdout.is_empty() {
                println!("{}", result.out());
            }
            if !result.stderr.is_empty() {
                println!("{}", result.err());
            }
        }

        self.log_result(&result);
        Ok(result)
    }

    /// HTTP request reported as a command; see `http::curl`.
    pub fn curl(&self, method: &str, url: &str, body: Option<&str>, filter: Option<&LineFilter>) -> CommandResult {
        self.curl_with_timeout(method, url, self.request_timeout, body, filter)
    }

    pub fn curl_with_timeout(
        &self,
        method: &str,
        url: &str,
        timeout: Duration,
        body: Option<&str>,
        filter: Option<&LineFilter>,
    ) -> CommandResult {
        let result = http::curl(&self.client, method, url, timeout, body, filter);
        echo_command(self.settings.print_commands, result.command.as_deref().unwrap_or_default());
        echo_command(self.settings.print_output, &result.out());
        result
    }

    /// JSON request with the default accept/content-type headers.
    pub fn request(&self, method: &str, url: &str, body: Option<&Value>) -> HarnessResult<Response> {
        http::request_json(&self.client, method, url, self.request_timeout, body)
    }

    /// Wait for the fixtures whose names contain any of `partial_names` (all fixtures when empty).
    ///
    /// On timeout the capture data is written (unless capture is off) and a failure is returned.
    pub fn wait_for_ready(
        &mut self,
        partial_names: &[&str],
        config: PollConfig,
        message: Option<&str>,
    ) -> HarnessResult<()> {
        let mut selected: Vec<&mut dyn Readiness> = self
            .containers
            .iter_mut()
            .filter(|c| partial_names.is_empty() || partial_names.iter().any(|p| c.name().contains(p)))
            .map(|c| c as &mut dyn Readiness)
            .collect();
        let count = selected.len();
        let verbose = u8::from(self.settings.print_commands);
        let unready = readiness::wait_for_ready(&mut selected, &config, message, verbose);
        if unready.is_empty() {
            return Ok(());
        }

        if self.settings.capture != CaptureScheme::None {
            self.write_capture_data();
        }
        let reason = match message {
            Some(message) => message.to_string(),
            None => format!("{count} containers to be ready"),
        };
        Err(HarnessError::Failed(format!(
            "Failed waiting for {} -- unready: {}",
            reason,
            unready.join(", ")
        )))
    }
}

impl Drop for IntegrationTestCase {
    fn drop(&mut self) {
        for mut container in self.containers.drain(..).rev() {
            container.terminate();
        }
    }
}

#[cfg(windows)]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", cmd]);
    command
}

#[cfg(not(windows))]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.args(["-c", cmd]);
    command
}

/// `cmd.exe` does not understand single quotes.
#[cfg(windows)]
fn shell_text(cmd: &str) -> String {
    cmd.replace('\'', "\"")
}

#[cfg(not(windows))]
fn shell_text(cmd: &str) -> String {
    cmd.to_string()
}

/// Entries whose `prop` equals `value`.
pub fn find_by_prop<'a>(entries: &'a [Value], prop: &str, value: &Value) -> Vec<&'a Value> {
    entries.iter().filter(|entry| entry.get(prop) == Some(value)).collect()
}

/// Whether any of the variables is unset or empty.
pub fn missing_any(env_var_names: &[&str]) -> bool {
    env_var_names
        .iter()
        .any(|name| env::var(name).map_or(true, |value| value.is_empty()))
}
