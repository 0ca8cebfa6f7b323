//! `ContainerRuntime` backed by the Docker Engine API.

use std::collections::{BTreeMap, HashMap};

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, ListContainersOptions,
    LogsOptions, StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::ListImagesOptions;
use bollard::models::{HostConfig, PortBinding as DockerPortBinding, PortMap};
use futures_util::StreamExt;
use tokio::runtime::{Builder, Runtime};

use super::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput, ImageSummary, PortBinding};
use crate::errors::{HarnessError, HarnessResult};

/// Seconds the engine waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Docker client plus the runtime its futures are driven on.
pub struct DockerRuntime {
    docker: Docker,
    rt: Runtime,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the platform socket).
    pub fn connect() -> HarnessResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(engine)?;
        let rt = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { docker, rt })
    }

    /// Whether the engine answers a ping.
    pub fn available(&self) -> bool {
        self.rt.block_on(self.docker.ping()).is_ok()
    }

    async fn image_tags(&self, image_id: &str) -> Vec<String> {
        match self.docker.inspect_image(image_id).await {
            Ok(image) => image.repo_tags.unwrap_or_default(),
            Err(e) => {
                tracing::debug!(image_id, "cannot inspect image: {}", e);
                Vec::new()
            }
        }
    }
}

fn engine(e: DockerError) -> HarnessError {
    HarnessError::runtime(e)
}

fn is_not_found(e: &DockerError) -> bool {
    matches!(e, DockerError::DockerResponseServerError { status_code: 404, .. })
}

fn convert_ports(ports: PortMap) -> BTreeMap<String, Vec<PortBinding>> {
    ports
        .into_iter()
        .map(|(key, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding {
                    host_ip: b.host_ip,
                    host_port: b.host_port,
                })
                .collect();
            (key, bindings)
        })
        .collect()
}

fn create_config(spec: &ContainerSpec) -> Config<String> {
    let mut exposed = HashMap::new();
    let mut bindings: PortMap = HashMap::new();
    for (internal, host) in &spec.ports {
        let key = format!("{internal}/tcp");
        exposed.insert(key.clone(), HashMap::new());
        if let Some(host) = host {
            // An empty host port makes the engine pick one.
            let host_port = if *host == 0 { String::new() } else { host.to_string() };
            bindings.insert(
                key,
                Some(vec![DockerPortBinding {
                    host_ip: None,
                    host_port: Some(host_port),
                }]),
            );
        }
    }

    Config {
        image: Some(spec.image.clone()),
        user: spec.user.map(|uid| uid.to_string()),
        env: Some(spec.env_list()),
        exposed_ports: Some(exposed),
        host_config: Some(HostConfig {
            auto_remove: Some(spec.auto_remove),
            port_bindings: Some(bindings),
            binds: Some(spec.binds()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl ContainerRuntime for DockerRuntime {
    fn list_images(&self) -> HarnessResult<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        let images = self.rt.block_on(self.docker.list_images(Some(options))).map_err(engine)?;
        Ok(images
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                tags: image.repo_tags,
                created: image.created,
            })
            .collect())
    }

    #[tracing::instrument(skip_all, fields(name = %spec.name, image = %spec.image))]
    fn run(&self, spec: &ContainerSpec) -> HarnessResult<String> {
        self.rt.block_on(async {
            let options = CreateContainerOptions {
                name: spec.name.clone(),
                platform: None,
            };
            let created = self
                .docker
                .create_container(Some(options), create_config(spec))
                .await
                .map_err(engine)?;
            for warning in &created.warnings {
                tracing::warn!("{}", warning);
            }
            self.docker
                .start_container(&created.id, None::<StartContainerOptions<String>>)
                .await
                .map_err(engine)?;
            Ok(created.id)
        })
    }

    fn inspect(&self, name: &str) -> HarnessResult<Option<ContainerState>> {
        self.rt.block_on(async {
            let info = match self.docker.inspect_container(name, None::<InspectContainerOptions>).await {
                Ok(info) => info,
                Err(e) if is_not_found(&e) => return Ok(None),
                Err(e) => return Err(engine(e)),
            };

            let mut image_tags = match &info.image {
                Some(image_id) => self.image_tags(image_id).await,
                None => Vec::new(),
            };
            if image_tags.is_empty() {
                image_tags.extend(info.config.as_ref().and_then(|c| c.image.clone()));
            }

            Ok(Some(ContainerState {
                id: info.id.unwrap_or_default(),
                name: info.name.unwrap_or_default().trim_start_matches('/').to_string(),
                status: info
                    .state
                    .and_then(|s| s.status)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                image_tags,
                ports: info
                    .network_settings
                    .and_then(|n| n.ports)
                    .map(convert_ports)
                    .unwrap_or_default(),
            }))
        })
    }

    fn list_containers(&self) -> HarnessResult<Vec<ContainerState>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.rt.block_on(self.docker.list_containers(Some(options))).map_err(engine)?;
        Ok(containers
            .into_iter()
            .map(|summary| {
                let mut ports: BTreeMap<String, Vec<PortBinding>> = BTreeMap::new();
                for port in summary.ports.unwrap_or_default() {
                    let protocol = port.typ.map_or_else(|| "tcp".to_string(), |t| t.to_string());
                    ports
                        .entry(format!("{}/{}", port.private_port, protocol))
                        .or_default()
                        .extend(port.public_port.map(|public| PortBinding {
                            host_ip: port.ip.clone(),
                            host_port: Some(public.to_string()),
                        }));
                }
                ContainerState {
                    id: summary.id.unwrap_or_default(),
                    name: summary
                        .names
                        .and_then(|names| names.into_iter().next())
                        .unwrap_or_default()
                        .trim_start_matches('/')
                        .to_string(),
                    // only running containers are listed
                    status: "running".to_string(),
                    image_tags: summary.image.into_iter().collect(),
                    ports,
                }
            })
            .collect())
    }

    fn stop(&self, name: &str) -> HarnessResult<()> {
        let options = StopContainerOptions { t: STOP_TIMEOUT_SECS };
        self.rt
            .block_on(self.docker.stop_container(name, Some(options)))
            .map_err(engine)
    }

    fn kill(&self, name: &str) -> HarnessResult<()> {
        self.rt
            .block_on(self.docker.kill_container(name, None::<KillContainerOptions<String>>))
            .map_err(engine)
    }

    fn logs(&self, name: &str) -> HarnessResult<Vec<u8>> {
        self.rt.block_on(async {
            let options = LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            };
            let mut stream = self.docker.logs(name, Some(options));
            let mut logs = Vec::new();
            while let Some(chunk) = stream.next().await {
                logs.extend_from_slice(&chunk.map_err(engine)?.into_bytes());
            }
            Ok(logs)
        })
    }

    fn exec(&self, name: &str, cmd: &[String]) -> HarnessResult<ExecOutput> {
        self.rt.block_on(async {
            let options = CreateExecOptions {
                cmd: Some(cmd.to_vec()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            };
            let created = self.docker.create_exec(name, options).await.map_err(engine)?;

            let mut output = Vec::new();
            if let StartExecResults::Attached { output: mut stream, .. } = self
                .docker
                .start_exec(&created.id, None::<StartExecOptions>)
                .await
                .map_err(engine)?
            {
                while let Some(chunk) = stream.next().await {
                    output.extend_from_slice(&chunk.map_err(engine)?.into_bytes());
                }
            }

            let inspected = self.docker.inspect_exec(&created.id).await.map_err(engine)?;
            Ok(ExecOutput {
                exit_code: inspected.exit_code.unwrap_or(-1),
                output,
            })
        })
    }

    fn put_archive(&self, name: &str, dir: &str, tar: Vec<u8>) -> HarnessResult<()> {
        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        self.rt
            .block_on(self.docker.upload_to_container(name, Some(options), tar.into()))
            .map_err(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_config_ports() {
        let spec = ContainerSpec::new("api", "petstore:1")
            .with_user(Some(1000))
            .with_port(8080, Some(0))
            .with_port(9090, Some(19090))
            .with_port(5005, None);
        let config = create_config(&spec);

        assert_eq!(config.user.as_deref(), Some("1000"));
        let exposed = config.exposed_ports.unwrap();
        assert_eq!(exposed.len(), 3);

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        assert_eq!(bindings.len(), 2);
        let ephemeral = bindings["8080/tcp"].as_ref().unwrap();
        assert_eq!(ephemeral[0].host_port.as_deref(), Some(""));
        let fixed = bindings["9090/tcp"].as_ref().unwrap();
        assert_eq!(fixed[0].host_port.as_deref(), Some("19090"));
    }

    #[test]
    fn test_convert_ports_keeps_unbound_keys() {
        let mut map: PortMap = HashMap::new();
        map.insert("80/tcp".into(), None);
        map.insert(
            "8080/tcp".into(),
            Some(vec![DockerPortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some("32768".into()),
            }]),
        );
        let ports = convert_ports(map);
        assert!(ports["80/tcp"].is_empty());
        assert_eq!(ports["8080/tcp"][0].host_port.as_deref(), Some("32768"));
    }
}
