// Docker container management using Bollard
// Images are built through the docker CLI since bollard needs a tar context

use crate::runtime::{ContainerRuntime, ProcessOutput, SandboxSpec, CACHE_MOUNT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Docker-backed runtime for warm sandboxes
///
/// **Docker Rules:**
/// 1. Sandboxes are plain containers named deterministically by the caller
/// 2. The main process is `sleep <n>`, so an abandoned sandbox exits on its own
/// 3. Containers are created with auto-remove, so an exited sandbox leaves nothing behind
/// 4. Work happens through `exec`, never by restarting the container
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(err, BollardError::DockerResponseServerError { status_code: 404, .. })
}

/// Removal races with auto-remove; 409 means removal is already in progress
fn is_gone_or_going(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code: 404 | 409, .. }
    )
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Wrap a command so `input` arrives on its stdin.
///
/// Exec stdin is fed the same way source files used to be written into
/// containers: base64 through `echo`, decoded in the sandbox.
fn with_stdin(command: &[String], input: &str) -> Vec<String> {
    let encoded = general_purpose::STANDARD.encode(input);
    let quoted: Vec<String> = command.iter().map(|arg| shell_quote(arg)).collect();
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("echo '{}' | base64 -d | {}", encoded, quoted.join(" ")),
    ]
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                debug!("✓ Image cache hit: {}", image);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => {
                debug!("Image cache miss: {}", image);
                Ok(false)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to inspect image '{}'", image)),
        }
    }

    async fn build_image(&self, image: &str, dockerfile: &str) -> Result<ProcessOutput> {
        info!(image, "Building image from Dockerfile on stdin");

        let mut child = Command::new("docker")
            .args(["build", "-t", image, "-"])
            .env("DOCKER_BUILDKIT", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to execute docker build. Is Docker installed and running?")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(dockerfile.as_bytes())
                .await
                .context("Failed to send Dockerfile to docker build")?;
            // Dropping stdin closes it so docker starts building
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for docker build")?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().map(i64::from).unwrap_or(-1),
            timed_out: false,
        })
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(info.state.and_then(|s| s.running).unwrap_or(false)),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to inspect container '{}'", name)),
        }
    }

    async fn start(&self, spec: &SandboxSpec) -> Result<()> {
        let mut binds = vec![format!("{}:{}", spec.host_workdir.display(), spec.mount_point)];
        if let Some(cache) = &spec.cache_dir {
            binds.push(format!("{}:{}", cache.display(), CACHE_MOUNT));
        }

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(vec!["sleep".to_string(), spec.sleep_secs.to_string()]),
            entrypoint: Some(vec![]), // Override image entrypoints; the sandbox only sleeps
            env: Some(spec.env.clone()),
            working_dir: Some(spec.mount_point.clone()),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(binds),
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        Ok(())
    }

    async fn exec(
        &self,
        name: &str,
        command: &[String],
        workdir: Option<&str>,
        stdin: Option<&str>,
    ) -> Result<ProcessOutput> {
        let cmd = match stdin {
            Some(input) => with_stdin(command, input),
            None => command.to_vec(),
        };

        let exec_config = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: workdir.map(str::to_string),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(name, exec_config)
            .await
            .with_context(|| format!("Failed to create exec in '{}'", name))?;

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let mut stdout = String::new();
        let mut stderr = String::new();

        match self.docker.start_exec(&exec.id, Some(start_config)).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(sandbox = name, error = %e, "Error reading exec output");
                            stderr.push_str(&format!("\n[Execution error: {}]", e));
                            break;
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                anyhow::bail!("Exec in '{}' unexpectedly detached", name);
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1),
            timed_out: false,
        })
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let remove_options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(name, Some(remove_options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_gone_or_going(&e) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove container '{}'", name)),
        }
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![prefix.to_string()]);

        let options = ListContainersOptions::<String> {
            all: false,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .context("Failed to list containers")?;

        // The name filter is a substring match and names carry a leading '/'
        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| n.starts_with(prefix))
            .collect())
    }
}
