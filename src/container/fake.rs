//! In-memory `ContainerRuntime` for tests.
//!
//! Records every operation so tests can assert on the sequence of engine calls, and lets a test decide how long
//! containers take to become ready.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput, ImageSummary, PortBinding};
use crate::errors::{HarnessError, HarnessResult};

const FIRST_EPHEMERAL_PORT: u16 = 32768;

#[derive(Debug)]
struct FakeContainer {
    spec: ContainerSpec,
    state: ContainerState,
    logs: Vec<u8>,
    inspections_until_ready: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    images: Vec<ImageSummary>,
    containers: BTreeMap<String, FakeContainer>,
    operations: Vec<String>,
    archives: Vec<(String, String, Vec<u8>)>,
    exec_output: ExecOutput,
    ready_after: u32,
    fail_kill: bool,
    next_id: u64,
    next_port: u16,
}

/// Shared handle; clones see the same engine.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_image(self, tag: &str, created: i64) -> Self {
        self.add_image(&[tag], created);
        self
    }

    pub fn add_image(&self, tags: &[&str], created: i64) {
        let mut state = self.state();
        let id = format!("sha256:{:064}", state.images.len());
        state.images.push(ImageSummary {
            id,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created,
        });
    }

    /// New containers report `created` for this many inspections before `running`.
    pub fn set_ready_after(&self, inspections: u32) {
        self.state().ready_after = inspections;
    }

    pub fn set_exec_output(&self, exit_code: i64, output: &str) {
        self.state().exec_output = ExecOutput {
            exit_code,
            output: output.as_bytes().to_vec(),
        };
    }

    pub fn fail_kills(&self, fail: bool) {
        self.state().fail_kill = fail;
    }

    pub fn append_logs(&self, name: &str, text: &str) {
        if let Some(container) = self.state().containers.get_mut(name) {
            container.logs.extend_from_slice(text.as_bytes());
        }
    }

    /// Register a running container that the harness did not start.
    pub fn add_running(&self, name: &str, image: &str) {
        let spec = ContainerSpec::new(name, image);
        let mut state = self.state();
        let container = new_container(&mut state, spec, 0);
        state.containers.insert(name.to_string(), container);
    }

    /// Engine calls so far, e.g. `run db`, `kill db`.
    pub fn operations(&self) -> Vec<String> {
        self.state().operations.clone()
    }

    /// Uploaded archives as `(container, dir, tar bytes)`.
    pub fn archives(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state().archives.clone()
    }

    /// The spec a container was started with.
    pub fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.state().containers.get(name).map(|c| c.spec.clone())
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }
}

fn new_container(state: &mut FakeState, spec: ContainerSpec, ready_after: u32) -> FakeContainer {
    state.next_id += 1;
    let id = format!("fake{:06}{:0>54}", state.next_id, "");

    let mut ports = BTreeMap::new();
    for (internal, host) in &spec.ports {
        let bindings = match host {
            Some(0) => {
                let port = FIRST_EPHEMERAL_PORT + state.next_port;
                state.next_port += 1;
                vec![binding(port)]
            }
            Some(port) => vec![binding(*port)],
            None => Vec::new(),
        };
        ports.insert(format!("{internal}/tcp"), bindings);
    }

    FakeContainer {
        state: ContainerState {
            id,
            name: spec.name.clone(),
            status: if ready_after == 0 { "running" } else { "created" }.to_string(),
            image_tags: vec![spec.image.clone()],
            ports,
        },
        spec,
        logs: Vec::new(),
        inspections_until_ready: ready_after,
    }
}

fn binding(port: u16) -> PortBinding {
    PortBinding {
        host_ip: Some("0.0.0.0".to_string()),
        host_port: Some(port.to_string()),
    }
}

fn no_such(name: &str) -> HarnessError {
    HarnessError::runtime(format!("No such container: {name}"))
}

impl ContainerRuntime for FakeRuntime {
    fn list_images(&self) -> HarnessResult<Vec<ImageSummary>> {
        Ok(self.state().images.clone())
    }

    fn run(&self, spec: &ContainerSpec) -> HarnessResult<String> {
        let mut state = self.state();
        state.operations.push(format!("run {}", spec.name));
        if state.containers.contains_key(&spec.name) {
            return Err(HarnessError::runtime(format!("Conflict: name {} is in use", spec.name)));
        }
        let ready_after = state.ready_after;
        let container = new_container(&mut state, spec.clone(), ready_after);
        let id = container.state.id.clone();
        state.containers.insert(spec.name.clone(), container);
        Ok(id)
    }

    fn inspect(&self, name: &str) -> HarnessResult<Option<ContainerState>> {
        let mut state = self.state();
        let Some(container) = state.containers.get_mut(name) else {
            return Ok(None);
        };
        if container.inspections_until_ready > 0 {
            container.inspections_until_ready -= 1;
            if container.inspections_until_ready == 0 {
                container.state.status = "running".to_string();
            }
        }
        Ok(Some(container.state.clone()))
    }

    fn list_containers(&self) -> HarnessResult<Vec<ContainerState>> {
        Ok(self
            .state()
            .containers
            .values()
            .filter(|c| c.state.is_running())
            .map(|c| c.state.clone())
            .collect())
    }

    fn stop(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.state();
        state.operations.push(format!("stop {name}"));
        remove_or_exit(&mut state, name)
    }

    fn kill(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.state();
        state.operations.push(format!("kill {name}"));
        if state.fail_kill {
            return Err(HarnessError::runtime(format!("cannot kill container: {name}")));
        }
        remove_or_exit(&mut state, name)
    }

    fn logs(&self, name: &str) -> HarnessResult<Vec<u8>> {
        self.state()
            .containers
            .get(name)
            .map(|c| c.logs.clone())
            .ok_or_else(|| no_such(name))
    }

    fn exec(&self, name: &str, cmd: &[String]) -> HarnessResult<ExecOutput> {
        let mut state = self.state();
        state.operations.push(format!("exec {name}: {}", cmd.join(" ")));
        match state.containers.get(name) {
            Some(c) if c.state.is_running() => Ok(state.exec_output.clone()),
            Some(_) => Err(HarnessError::runtime(format!("Container {name} is not running"))),
            None => Err(no_such(name)),
        }
    }

    fn put_archive(&self, name: &str, dir: &str, tar: Vec<u8>) -> HarnessResult<()> {
        let mut state = self.state();
        state.operations.push(format!("put_archive {name}:{dir}"));
        if !state.containers.contains_key(name) {
            return Err(no_such(name));
        }
        state.archives.push((name.to_string(), dir.to_string(), tar));
        Ok(())
    }
}

fn remove_or_exit(state: &mut FakeState, name: &str) -> HarnessResult<()> {
    let Some(container) = state.containers.get_mut(name) else {
        return Err(no_such(name));
    };
    if container.spec.auto_remove {
        state.containers.remove(name);
    } else {
        container.state.status = "exited".to_string();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_and_inspect() {
        let fake = FakeRuntime::new();
        let spec = ContainerSpec::new("db", "postgres:16").with_port(5432, Some(0));
        fake.run(&spec).unwrap();

        let state = fake.inspect("db").unwrap().unwrap();
        assert!(state.is_running());
        assert_eq!(state.short_id(), "fake000001");
        assert_eq!(state.ports["5432/tcp"][0].host_port.as_deref(), Some("32768"));
        assert!(fake.inspect("other").unwrap().is_none());
    }

    #[test]
    fn test_ready_after_counts_inspections() {
        let fake = FakeRuntime::new();
        fake.set_ready_after(2);
        fake.run(&ContainerSpec::new("slow", "img")).unwrap();
        assert_eq!(fake.inspect("slow").unwrap().unwrap().status, "created");
        assert_eq!(fake.inspect("slow").unwrap().unwrap().status, "running");
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let fake = FakeRuntime::new();
        fake.run(&ContainerSpec::new("db", "img")).unwrap();
        assert!(fake.run(&ContainerSpec::new("db", "img")).is_err());
    }

    #[test]
    fn test_stop_respects_auto_remove() {
        let fake = FakeRuntime::new();
        fake.run(&ContainerSpec::new("gone", "img")).unwrap();
        fake.run(&ContainerSpec::new("kept", "img").with_auto_remove(false)).unwrap();
        fake.stop("gone").unwrap();
        fake.stop("kept").unwrap();
        assert!(fake.inspect("gone").unwrap().is_none());
        assert_eq!(fake.inspect("kept").unwrap().unwrap().status, "exited");
        assert!(fake.list_containers().unwrap().is_empty());
        assert_eq!(fake.operations(), vec!["run gone", "run kept", "stop gone", "stop kept"]);
    }
}
