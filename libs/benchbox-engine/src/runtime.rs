/// Container Runtime - the seam between the engine and the sandbox technology
///
/// **Responsibility:**
/// Primitive operations on images and named, long-lived containers.
///
/// **Boundary:**
/// - Runtime knows HOW to talk to the container daemon
/// - Runtime does NOT know about warm reuse, sentinels or timeouts
/// - Runtime does NOT know about guest languages or the driver protocol
///
/// Production uses `DockerRuntime` (docker.rs); tests use an in-memory fake.

use async_trait::async_trait;
use std::path::PathBuf;

/// Captured result of one process run inside (or against) a sandbox
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Synthetic failure used when the process could not be run or waited on
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: -1,
            timed_out: false,
        }
    }
}

/// Where `SandboxSpec::cache_dir` appears inside a sandbox
pub const CACHE_MOUNT: &str = "/cache";

/// Everything needed to start a warm sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    pub name: String,
    pub image: String,
    /// Absolute host directory mounted at `mount_point`
    pub host_workdir: PathBuf,
    pub mount_point: String,
    /// Optional host cache directory mounted at `CACHE_MOUNT`
    pub cache_dir: Option<PathBuf>,
    /// The sandbox's main process sleeps this long, bounding its lifetime
    pub sleep_secs: u64,
    pub env: Vec<String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> anyhow::Result<bool>;

    /// Build `image` from Dockerfile text; a nonzero exit is reported in the output
    async fn build_image(&self, image: &str, dockerfile: &str) -> anyhow::Result<ProcessOutput>;

    async fn is_running(&self, name: &str) -> anyhow::Result<bool>;

    async fn start(&self, spec: &SandboxSpec) -> anyhow::Result<()>;

    /// Run a command in a running sandbox and wait for it to finish
    async fn exec(
        &self,
        name: &str,
        command: &[String],
        workdir: Option<&str>,
        stdin: Option<&str>,
    ) -> anyhow::Result<ProcessOutput>;

    /// Stop and remove; removing a sandbox that does not exist is not an error
    async fn remove(&self, name: &str) -> anyhow::Result<()>;

    /// Names of running sandboxes starting with `prefix`
    async fn list_running(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}
