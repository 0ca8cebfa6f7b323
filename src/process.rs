//! Subprocesses that run alongside a test.
//!
//! For commands that run to completion use `IntegrationTestCase::command`; a `BackgroundProcess` is for servers and
//! watchers that a test starts, talks to, and stops.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use itkit_core::CommandResult;
use itkit_core::result::split_output;

use crate::errors::{HarnessError, HarnessResult};
use crate::settings::{Settings, resolve_print};
use crate::utils::{echo_command, echo_output};

/// How long `stop` waits for the output pipes to close after the child is gone.
///
/// A grandchild that inherited stdout or stderr keeps the pipe open after the child is killed.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

struct Running {
    child: Child,
    started: Instant,
    stdout: Drain,
    stderr: Drain,
}

/// Output read so far from one pipe, and a signal sent when the pipe closes.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    closed: Receiver<()>,
}

impl Drain {
    /// Wait for the pipe to close until `deadline`, then take whatever was read.
    fn collect(self, deadline: Instant) -> Vec<u8> {
        if self.closed.recv_timeout(deadline.saturating_duration_since(Instant::now())).is_err() {
            tracing::debug!("output pipe still open, returning partial output");
        }
        self.buf.lock().map(|mut buf| std::mem::take(&mut *buf)).unwrap_or_default()
    }
}

/// A program spawned in the background with its stdout and stderr collected.
pub struct BackgroundProcess {
    name: String,
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    print_commands: Option<bool>,
    print_output: Option<bool>,
    settings: Settings,
    running: Option<Running>,
}

impl BackgroundProcess {
    /// Print defaults come from the `ITKIT_TEST_*` environment until `with_settings` is applied.
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
            print_commands: None,
            print_output: None,
            settings: Settings::from_env(),
            running: None,
        }
    }

    /// Use `settings` for print defaults and export them to the child.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_print_commands(mut self, on: bool) -> Self {
        self.print_commands = Some(on);
        self
    }

    pub fn with_print_output(mut self, on: bool) -> Self {
        self.print_output = Some(on);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program and arguments as one line.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn prints_commands(&self) -> bool {
        resolve_print(self.print_commands, self.settings.print_commands)
    }

    fn prints_output(&self) -> bool {
        resolve_print(self.print_output, self.settings.print_output)
    }

    pub fn start(&mut self) -> HarnessResult<()> {
        if self.running.is_some() {
            tracing::debug!(name = %self.name, "process already started");
            return Ok(());
        }
        let command_line = self.command_line();
        echo_command(self.prints_commands(), &command_line);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.settings.env_pairs())
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.error(format!("cannot spawn '{command_line}': {e}")))?;
        let started = Instant::now();

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        tracing::debug!(name = %self.name, pid = child.id(), "process started");

        self.running = Some(Running {
            child,
            started,
            stdout,
            stderr,
        });
        Ok(())
    }

    /// Whether the process was started and has not exited yet.
    pub fn is_running(&mut self) -> bool {
        self.running
            .as_mut()
            .is_some_and(|running| matches!(running.child.try_wait(), Ok(None)))
    }

    /// Kill the process and collect what it wrote. `None` when it was never started.
    ///
    /// On error the process stays registered, so `terminate` and drop can still reach it.
    pub fn stop(&mut self) -> HarnessResult<Option<CommandResult>> {
        let command_line = self.command_line();
        let prints_commands = self.prints_commands();
        let Some(running) = self.running.as_mut() else {
            return Ok(None);
        };
        echo_command(prints_commands, &format!("kill {command_line}"));

        if running.child.try_wait()?.is_none() {
            running.child.kill()?;
        }
        running.child.wait()?;

        let Some(running) = self.running.take() else {
            return Ok(None);
        };
        let elapsed = running.started.elapsed();
        let deadline = Instant::now() + OUTPUT_GRACE;
        let stdout = running.stdout.collect(deadline);
        let stderr = running.stderr.collect(deadline);
        let result = CommandResult::new(command_line, 0, elapsed)
            .with_stdout(split_output(&stdout))
            .with_stderr(split_output(&stderr));

        echo_output(self.prints_output(), &result);
        Ok(Some(result))
    }

    /// Kill without collecting output; errors are logged and swallowed.
    pub fn terminate(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        let outcome = match running.child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => running.child.kill().and_then(|_| running.child.wait().map(|_| ())),
        };
        if let Err(e) = outcome {
            tracing::warn!(name = %self.name, "failed to terminate: {}", e);
        }
    }

    fn error(&self, message: String) -> HarnessError {
        HarnessError::Process {
            name: self.name.clone(),
            message,
        }
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for BackgroundProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundProcess")
            .field("name", &self.name)
            .field("command", &self.command_line())
            .field("started", &self.running.is_some())
            .finish()
    }
}

fn drain<P: Read + Send + 'static>(pipe: Option<P>) -> Drain {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, closed) = mpsc::channel();
    let sink = Arc::clone(&buf);
    thread::spawn(move || {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!("reading process output stopped: {}", e);
                        break;
                    }
                }
            }
        }
        let _ = tx.send(());
    });
    Drain { buf, closed }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn quiet(process: BackgroundProcess) -> BackgroundProcess {
        process.with_settings(&Settings::default())
    }

    #[test]
    fn test_stop_before_start_is_none() {
        let mut process = quiet(BackgroundProcess::new("idle", "sleep", ["5"]));
        assert!(!process.is_running());
        assert!(process.stop().unwrap().is_none());
    }

    #[test]
    fn test_collects_stdout_and_stderr() {
        let mut process = quiet(BackgroundProcess::new("echo", "sh", ["-c", "echo hello; echo oops >&2"]));
        process.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while process.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        let result = process.stop().unwrap().unwrap();
        assert_eq!(result.return_value, 0);
        assert_eq!(result.out_contains("hell"), Some("hello"));
        assert_eq!(result.stderr.first().map(String::as_str), Some("oops"));
        assert_eq!(result.command.as_deref(), Some("sh -c echo hello; echo oops >&2"));
    }

    #[test]
    fn test_stop_kills_long_running() {
        let mut process = quiet(BackgroundProcess::new("sleeper", "sleep", ["30"]));
        process.start().unwrap();
        assert!(process.is_running());

        let result = process.stop().unwrap().unwrap();
        assert!(result.elapsed < Duration::from_secs(30));
        assert!(!process.is_running());
        // state is reset
        assert!(process.stop().unwrap().is_none());
    }

    #[test]
    fn test_stop_returns_while_grandchild_holds_pipes() {
        let mut process = quiet(BackgroundProcess::new("srv", "sh", ["-c", "sleep 8; echo done"]));
        process.start().unwrap();
        thread::sleep(Duration::from_millis(200));

        let begin = Instant::now();
        let result = process.stop().unwrap().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(3), "stop blocked {:?}", begin.elapsed());
        assert!(result.out_contains("done").is_none());
        assert!(!process.is_running());
    }

    #[test]
    fn test_stop_after_exit_keeps_output_and_resets() {
        let mut process = quiet(BackgroundProcess::new("quick", "sh", ["-c", "echo first; echo second"]));
        process.start().unwrap();
        while process.is_running() {
            thread::sleep(Duration::from_millis(20));
        }

        let result = process.stop().unwrap().unwrap();
        assert_eq!(result.stdout[..2], ["first", "second"]);
        process.terminate();
        assert!(process.stop().unwrap().is_none());
    }

    #[test]
    fn test_child_sees_settings_and_env() {
        let settings = Settings::default().with_job_id("j9");
        let mut process = BackgroundProcess::new("env", "sh", ["-c", "echo $ITKIT_TEST_JOB_ID-$EXTRA"])
            .with_settings(&settings)
            .with_env("EXTRA", "x");
        process.start().unwrap();
        while process.is_running() {
            thread::sleep(Duration::from_millis(20));
        }
        let result = process.stop().unwrap().unwrap();
        assert_eq!(result.stdout[0], "j9-x");
    }

    #[test]
    fn test_spawn_failure_names_process() {
        let mut process = quiet(BackgroundProcess::new("ghost", "/nonexistent/itkit-binary", Vec::<String>::new()));
        let err = process.start().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut process = quiet(BackgroundProcess::new("sleeper", "sleep", ["30"]));
        process.start().unwrap();
        process.terminate();
        process.terminate();
        assert!(!process.is_running());
    }
}
