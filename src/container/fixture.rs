//! A named container used as a test fixture.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use itkit_core::CommandResult;
use itkit_core::result::split_output;

use super::image_exists;
use super::runtime::{ContainerRuntime, ContainerSpec, ContainerState, VolumeMount, split_command};
use crate::errors::{HarnessError, HarnessResult};
use crate::readiness::Readiness;
use crate::settings::{Settings, resolve_print};
use crate::utils::{echo_command, local_ip};

const ANY_HOST: &str = "0.0.0.0";

/// Lifecycle wrapper around one container.
///
/// The wrapper is "started" between a successful `start()` and the next `stop()`/`kill()`/`terminate()`; a
/// refresh that no longer finds the container also clears it.
pub struct Container {
    /// Fixture type shown in messages, e.g. `PetStore`.
    kind: String,
    spec: ContainerSpec,
    runtime: Arc<dyn ContainerRuntime>,
    print_commands: Option<bool>,
    print_output: Option<bool>,
    settings: Settings,
    state: Option<ContainerState>,
    last_log_size: usize,
}

impl Container {
    pub fn new(kind: impl Into<String>, spec: ContainerSpec, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            kind: kind.into(),
            spec,
            runtime,
            print_commands: None,
            print_output: None,
            settings: Settings::from_env(),
            state: None,
            last_log_size: 0,
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.settings = settings.clone();
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
        &self.spec.name
    }

    pub fn image(&self) -> &str {
        &self.spec.image
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn state(&self) -> Option<&ContainerState> {
        self.state.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.state.is_some()
    }

    fn prints_commands(&self) -> bool {
        resolve_print(self.print_commands, self.settings.print_commands)
    }

    fn prints_output(&self) -> bool {
        resolve_print(self.print_output, self.settings.print_output)
    }

    fn not_started(&self, action: impl Into<String>) -> HarnessError {
        HarnessError::NotStarted {
            name: self.spec.name.clone(),
            action: action.into(),
        }
    }

    pub fn start(&mut self) -> HarnessResult<()> {
        self.start_with_info("")
    }

    /// Start the container; `info` is appended to the "Started" echo.
    #[tracing::instrument(skip_all, fields(name = %self.spec.name))]
    pub fn start_with_info(&mut self, info: &str) -> HarnessResult<()> {
        if self.state.is_some() {
            tracing::info!("already running {:?}", self);
            return Ok(());
        }
        if !image_exists(self.runtime.as_ref(), &self.spec.image)? {
            return Err(HarnessError::ImageNotFound {
                kind: self.kind.clone(),
                image: self.spec.image.clone(),
            });
        }

        let id = self.runtime.run(&self.spec)?;
        // the run response has no port bindings yet; ephemeral ports appear on inspect
        self.state = self.runtime.inspect(&self.spec.name)?.or(Some(ContainerState {
            id,
            name: self.spec.name.clone(),
            ..Default::default()
        }));

        if self.prints_commands() {
            let extra = if info.is_empty() { String::new() } else { format!(" - {info}") };
            println!("Started '{}' ({}{})", self.spec.name, self.spec.image, extra);
        }
        Ok(())
    }

    /// Short id of the running container.
    pub fn short_id(&self) -> Option<&str> {
        self.state.as_ref().map(ContainerState::short_id)
    }

    /// Re-read the container from the engine; clears the handle when it is gone.
    pub fn refresh(&mut self) -> HarnessResult<()> {
        if self.state.is_none() {
            return Ok(());
        }
        self.state = self.runtime.inspect(&self.spec.name)?;
        Ok(())
    }

    pub fn status(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.status.as_str())
    }

    pub fn stop(&mut self) -> HarnessResult<()> {
        if self.state.is_none() {
            return Ok(());
        }
        self.runtime.stop(&self.spec.name)?;
        echo_command(self.prints_commands(), &format!("Stopped '{}'", self.spec.name));
        self.state = None;
        Ok(())
    }

    pub fn kill(&mut self) -> HarnessResult<()> {
        if self.state.is_none() {
            return Ok(());
        }
        self.runtime.kill(&self.spec.name)?;
        echo_command(self.prints_commands(), &format!("Killed '{}'", self.spec.name));
        self.state = None;
        Ok(())
    }

    /// Kill for cleanup paths: failures are logged, never returned.
    pub fn terminate(&mut self) {
        if self.state.is_none() {
            return;
        }
        match self.runtime.kill(&self.spec.name) {
            Ok(()) => echo_command(self.prints_commands(), &format!("Terminated '{}'", self.spec.name)),
            Err(e) => tracing::warn!("Failed to kill '{}': {}", self.spec.name, e),
        }
        self.state = None;
    }

    /// Container logs as text; empty when not started.
    pub fn logs(&self) -> HarnessResult<String> {
        if self.state.is_none() {
            return Ok(String::new());
        }
        let bytes = self.runtime.logs(&self.spec.name)?;
        Ok(String::from_utf8_lossy(&bytes).replace('\r', ""))
    }

    /// Remember the current log size for a later `log_snapshot_diff`.
    pub fn log_snapshot_set(&mut self) -> HarnessResult<CommandResult> {
        let cmd = format!("docker logs {} | wc --chars", self.spec.name);
        echo_command(self.prints_commands(), &cmd);

        let start = Instant::now();
        self.last_log_size = self.logs()?.len();
        let elapsed = start.elapsed();

        let output = format!("logSize: {}", self.last_log_size);
        echo_command(self.prints_output(), &output);
        Ok(CommandResult::new(cmd, 0, elapsed).with_stdout(vec![output, String::new()]))
    }

    /// Logs written since the last `log_snapshot_set`.
    pub fn log_snapshot_diff(&self) -> HarnessResult<CommandResult> {
        let cmd = format!("docker logs {} | tail -c +{}", self.spec.name, self.last_log_size);
        echo_command(self.prints_commands(), &cmd);

        let start = Instant::now();
        let logs = self.logs()?;
        let tail = logs.get(self.last_log_size..).unwrap_or_default();
        let elapsed = start.elapsed();

        echo_command(self.prints_output(), tail);
        Ok(CommandResult::new(cmd, 0, elapsed).with_stdout(tail.split('\n').map(str::to_string).collect()))
    }

    /// Refresh and report whether the engine says `running`.
    pub fn is_ready(&mut self) -> bool {
        if self.state.is_none() {
            return false;
        }
        if let Err(e) = self.refresh() {
            tracing::debug!(name = %self.spec.name, "readiness check failed: {}", e);
            return false;
        }
        self.state.as_ref().is_some_and(ContainerState::is_running)
    }

    /// First tag of the image the container runs.
    pub fn running_image(&self) -> Option<&str> {
        self.state.as_ref()?.image_tags.first().map(String::as_str)
    }

    /// Run `cmd` inside the container.
    pub fn shell_cmd(&self, cmd: &str) -> HarnessResult<CommandResult> {
        if self.state.is_none() {
            return Err(self.not_started(format!("run '{cmd}'")));
        }
        let command = format!("{} exec: {}", self.spec.name, cmd);
        echo_command(self.prints_commands(), &command);

        let start = Instant::now();
        let exec = self.runtime.exec(&self.spec.name, &split_command(cmd))?;
        let elapsed = start.elapsed();

        let stdout = split_output(&exec.output);
        echo_command(self.prints_output(), &stdout.join("\n"));
        let return_value = i32::try_from(exec.exit_code).unwrap_or(-1);
        Ok(CommandResult::new(command, return_value, elapsed).with_stdout(stdout))
    }

    /// `ip:port` on the host for an internal port, with `0.0.0.0` replaced by this host's address.
    pub fn host_addr_for_port(&self, internal: u16) -> Option<String> {
        let binding = self.state.as_ref()?.bindings_for(internal)?.first()?;
        let ip = match binding.host_ip.as_deref() {
            None | Some("") | Some(ANY_HOST) => local_ip().to_string(),
            Some(ip) => ip.to_string(),
        };
        Some(format!("{}:{}", ip, binding.host_port.as_deref().unwrap_or_default()))
    }

    /// Add (or with `None`, remove) a bind mount. Only allowed before `start()`.
    pub fn set_mount(&mut self, host: impl AsRef<Path>, container_path: Option<&str>, mode: &str) -> HarnessResult<()> {
        if self.state.is_some() {
            return Err(HarnessError::AlreadyStarted {
                name: self.spec.name.clone(),
            });
        }
        let host = host.as_ref().to_path_buf();
        match container_path {
            Some(bind) => {
                self.spec.volumes.insert(
                    host,
                    VolumeMount {
                        bind: bind.to_string(),
                        mode: mode.to_string(),
                    },
                );
            }
            None => {
                self.spec.volumes.remove(&host);
            }
        }
        Ok(())
    }

    /// Copy the contents of `host_dir` into `container_dir`.
    pub fn copy_dir(&self, host_dir: impl AsRef<Path>, container_dir: &str) -> HarnessResult<()> {
        if self.state.is_none() {
            return Err(self.not_started(format!("copy to '{container_dir}'")));
        }
        let mut builder = tar::Builder::new(Vec::new());
        // an empty archive path drops the host directory from entry names
        builder.append_dir_all("", host_dir.as_ref())?;
        let archive = builder.into_inner()?;
        self.runtime.put_archive(&self.spec.name, container_dir, archive)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}, container={:?})", self.kind, self.spec.name, self.short_id())
    }
}

impl Readiness for Container {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn is_ready(&mut self) -> bool {
        Container::is_ready(self)
    }
}

/// A fixture type built around a `Container`.
///
/// Implementors usually add typed accessors (base URLs, credentials) on top of the container; test cases find
/// them again with `IntegrationTestCase::containers_of`.
pub trait ContainerFixture: Send + 'static {
    fn container(&self) -> &Container;

    fn container_mut(&mut self) -> &mut Container;

    /// Extra text for the "Started" echo.
    fn info(&self) -> String {
        String::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.container().name()
    }

    fn start(&mut self) -> HarnessResult<()> {
        let info = self.info();
        self.container_mut().start_with_info(&info)
    }

    fn stop(&mut self) -> HarnessResult<()> {
        self.container_mut().stop()
    }

    fn terminate(&mut self) {
        self.container_mut().terminate();
    }
}

impl ContainerFixture for Container {
    fn container(&self) -> &Container {
        self
    }

    fn container_mut(&mut self) -> &mut Container {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Readiness for Box<dyn ContainerFixture> {
    fn name(&self) -> &str {
        self.container().name()
    }

    fn is_ready(&mut self) -> bool {
        self.container_mut().is_ready()
    }
}
