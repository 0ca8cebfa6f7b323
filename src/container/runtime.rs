//! The seam between container fixtures and the container engine.
//!
//! Everything above this trait works with plain data; `DockerRuntime` is the production implementation and
//! `FakeRuntime` the in-memory one used by tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::HarnessResult;

/// A host-side binding of an exposed container port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortBinding {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

/// Bind-mount target for a host path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub bind: String,
    /// `rw` or `ro`.
    pub mode: String,
}

/// Everything needed to run a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Numeric user to run as. Defaults to the current user on Unix.
    pub user: Option<u32>,
    pub auto_remove: bool,
    /// Internal port -> host port; `Some(0)` asks for an ephemeral port, `None` leaves the port unpublished.
    pub ports: BTreeMap<u16, Option<u16>>,
    /// Host path -> mount.
    pub volumes: BTreeMap<PathBuf, VolumeMount>,
    pub environment: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            user: current_uid(),
            auto_remove: true,
            ports: BTreeMap::new(),
            volumes: BTreeMap::new(),
            environment: BTreeMap::new(),
        }
    }

    pub fn with_user(mut self, user: Option<u32>) -> Self {
        self.user = user;
        self
    }

    pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    pub fn with_port(mut self, internal: u16, host: Option<u16>) -> Self {
        self.ports.insert(internal, host);
        self
    }

    pub fn with_volume(mut self, host: impl Into<PathBuf>, bind: impl Into<String>, mode: impl Into<String>) -> Self {
        self.volumes.insert(
            host.into(),
            VolumeMount {
                bind: bind.into(),
                mode: mode.into(),
            },
        );
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Volumes in `host:bind:mode` form.
    pub fn binds(&self) -> Vec<String> {
        self.volumes
            .iter()
            .map(|(host, mount)| format!("{}:{}:{}", host.display(), mount.bind, mount.mode))
            .collect()
    }

    /// Environment in `KEY=value` form.
    pub fn env_list(&self) -> Vec<String> {
        self.environment.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;

    // /proc/self is owned by the effective user of the process.
    std::fs::metadata("/proc/self").ok().map(|meta| meta.uid())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}

/// A running (or recently running) container as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    /// Engine status such as `created`, `running` or `exited`.
    pub status: String,
    pub image_tags: Vec<String>,
    /// Keyed like the engine does, e.g. `8080/tcp`.
    pub ports: BTreeMap<String, Vec<PortBinding>>,
}

impl ContainerState {
    pub fn short_id(&self) -> &str {
        let end = self.id.char_indices().nth(10).map_or(self.id.len(), |(i, _)| i);
        &self.id[..end]
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    /// Bindings for an internal port, whatever its protocol suffix.
    pub fn bindings_for(&self, internal: u16) -> Option<&[PortBinding]> {
        let port = internal.to_string();
        self.ports
            .iter()
            .find(|(key, _)| key.split('/').next() == Some(port.as_str()))
            .map(|(_, bindings)| bindings.as_slice())
    }
}

/// A local image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageSummary {
    pub id: String,
    pub tags: Vec<String>,
    /// Creation time, seconds since the epoch.
    pub created: i64,
}

/// Result of running a command inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub exit_code: i64,
    /// Interleaved stdout and stderr.
    pub output: Vec<u8>,
}

/// Blocking operations on a container engine.
pub trait ContainerRuntime: Send + Sync {
    fn list_images(&self) -> HarnessResult<Vec<ImageSummary>>;

    /// Create and start a detached container, returning its id.
    fn run(&self, spec: &ContainerSpec) -> HarnessResult<String>;

    /// `None` when no container with that name or id exists.
    fn inspect(&self, name: &str) -> HarnessResult<Option<ContainerState>>;

    /// Running containers.
    fn list_containers(&self) -> HarnessResult<Vec<ContainerState>>;

    fn stop(&self, name: &str) -> HarnessResult<()>;

    fn kill(&self, name: &str) -> HarnessResult<()>;

    /// Combined stdout and stderr logs.
    fn logs(&self, name: &str) -> HarnessResult<Vec<u8>>;

    fn exec(&self, name: &str, cmd: &[String]) -> HarnessResult<ExecOutput>;

    /// Extract a tar archive into `dir` inside the container.
    fn put_archive(&self, name: &str, dir: &str, tar: Vec<u8>) -> HarnessResult<()>;
}

/// Split a command line into words, honouring single and double quotes.
pub fn split_command(cmd: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in cmd.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec = ContainerSpec::new("db", "postgres:16");
        assert!(spec.auto_remove);
        assert!(spec.ports.is_empty());
        #[cfg(target_os = "linux")]
        assert!(spec.user.is_some());
    }

    #[test]
    fn test_binds_and_env() {
        let spec = ContainerSpec::new("db", "postgres:16")
            .with_volume("/tmp/data", "/var/lib/data", "ro")
            .with_env("B", "2")
            .with_env("A", "1");
        assert_eq!(spec.binds(), vec!["/tmp/data:/var/lib/data:ro"]);
        assert_eq!(spec.env_list(), vec!["A=1", "B=2"]);
    }

    #[test]
    fn test_short_id() {
        let state = ContainerState {
            id: "0123456789abcdef".into(),
            ..Default::default()
        };
        assert_eq!(state.short_id(), "0123456789");
        let state = ContainerState {
            id: "abc".into(),
            ..Default::default()
        };
        assert_eq!(state.short_id(), "abc");
    }

    #[test]
    fn test_bindings_for_ignores_protocol() {
        let mut state = ContainerState::default();
        state.ports.insert(
            "8080/tcp".into(),
            vec![PortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some("32768".into()),
            }],
        );
        state.ports.insert("80/tcp".into(), vec![]);
        assert_eq!(state.bindings_for(8080).map(|b| b.len()), Some(1));
        assert_eq!(state.bindings_for(80).map(|b| b.len()), Some(0));
        assert!(state.bindings_for(808).is_none());
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("ls -la /tmp"), vec!["ls", "-la", "/tmp"]);
        assert_eq!(
            split_command(r#"sh -c 'echo "hi there"'  "#),
            vec!["sh", "-c", r#"echo "hi there""#]
        );
        assert_eq!(split_command("printf ''"), vec!["printf", ""]);
        assert!(split_command("   ").is_empty());
    }
}
