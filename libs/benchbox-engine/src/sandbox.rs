/// Sandbox Controller - warm, reusable containers per problem identity
///
/// **Lifecycle:**
/// 1. `ensure_image` builds the adapter's image once
/// 2. `ensure_warm` starts a sleeping container with the workdir mounted,
///    or reuses the running one after a quick health check
/// 3. `exec` runs commands inside it, bounded by a timeout
/// 4. `shutdown` / `shutdown_all` / `reap_idle` remove it
///
/// Last use is tracked in `<state_dir>/<sandbox>.lastused` on the host,
/// so idle reaping works across CLI invocations.

use crate::adapters::LanguageAdapter;
use crate::error::{EngineError, Result};
use crate::runtime::{ContainerRuntime, ProcessOutput, SandboxSpec, CACHE_MOUNT};
use benchbox_common::config::EngineConfig;
use benchbox_common::naming::{sandbox_from_sentinel, sentinel_path};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MOUNT_POINT: &str = "/workspace";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);


pub struct SandboxController {
    runtime: Arc<dyn ContainerRuntime>,
    state_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    sleep_secs: u64,
    build_timeout: Duration,
}

impl SandboxController {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &EngineConfig) -> Self {
        Self {
            runtime,
            state_dir: config.state_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            sleep_secs: config.container_sleep_secs,
            build_timeout: config.build_timeout(),
        }
    }

    /// Build the adapter's image unless it already exists locally
    #[tracing::instrument(skip(self, adapter), fields(image = %adapter.image()))]
    pub async fn ensure_image(&self, adapter: &dyn LanguageAdapter) -> Result<()> {
        let image = adapter.image();
        if self
            .runtime
            .image_exists(image)
            .await
            .map_err(|source| EngineError::Runtime { source })?
        {
            return Ok(());
        }

        info!("Image not found locally, building");
        let build = tokio::time::timeout(
            self.build_timeout,
            self.runtime.build_image(image, adapter.dockerfile()),
        )
        .await;

        let output = match build {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(EngineError::Runtime { source }),
            Err(_) => {
                return Err(EngineError::ImageBuild {
                    image: image.to_string(),
                    exit_code: -1,
                    stderr: timeout_message(self.build_timeout),
                })
            }
        };

        if output.exit_code != 0 {
            return Err(EngineError::ImageBuild {
                image: image.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        info!("✓ Image built");
        Ok(())
    }

    /// Make sure `name` is running with `workdir` mounted at /workspace
    #[tracing::instrument(skip(self, adapter, workdir), fields(image = %adapter.image()))]
    pub async fn ensure_warm(
        &self,
        adapter: &dyn LanguageAdapter,
        workdir: &Path,
        name: &str,
    ) -> Result<()> {
        let running = self
            .runtime
            .is_running(name)
            .await
            .map_err(|source| EngineError::Runtime { source })?;

        if running {
            if self.healthy(name).await {
                debug!("Reusing warm sandbox");
                self.touch(name);
                return Ok(());
            }
            warn!("Warm sandbox failed health check, restarting");
        }

        // A stopped container from a failed start still holds the name
        self.runtime
            .remove(name)
            .await
            .map_err(|source| EngineError::SandboxStart {
                sandbox: name.to_string(),
                source,
            })?;

        let host_workdir = workdir.canonicalize().map_err(|source| EngineError::Workspace {
            path: workdir.to_path_buf(),
            source,
        })?;

        let mut env = Vec::new();
        if let Some(cache) = &self.cache_dir {
            fs::create_dir_all(cache).map_err(|source| EngineError::Workspace {
                path: cache.clone(),
                source,
            })?;
            env.extend(
                adapter
                    .cache_env()
                    .iter()
                    .map(|(var, dir)| format!("{}={}/{}", var, CACHE_MOUNT, dir)),
            );
        }

        let spec = SandboxSpec {
            name: name.to_string(),
            image: adapter.image().to_string(),
            host_workdir,
            mount_point: MOUNT_POINT.to_string(),
            cache_dir: self.cache_dir.clone(),
            sleep_secs: self.sleep_secs,
            env,
        };

        info!(workdir = %spec.host_workdir.display(), "Starting sandbox");
        self.runtime
            .start(&spec)
            .await
            .map_err(|source| EngineError::SandboxStart {
                sandbox: name.to_string(),
                source,
            })?;

        if !self.healthy(name).await {
            return Err(EngineError::SandboxStart {
                sandbox: name.to_string(),
                source: anyhow::anyhow!("sandbox did not answer the health check"),
            });
        }

        self.touch(name);
        info!("✓ Sandbox ready");
        Ok(())
    }

    /// Run a command in a sandbox. Never fails: runtime errors and timeouts
    /// come back as exit code -1 with the reason on stderr.
    pub async fn exec(
        &self,
        name: &str,
        command: &[String],
        workdir: Option<&str>,
        stdin: Option<&str>,
        timeout: Duration,
    ) -> ProcessOutput {
        self.touch(name);
        debug!(sandbox = name, command = ?command, "exec");

        let result =
            tokio::time::timeout(timeout, self.runtime.exec(name, command, workdir, stdin)).await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(sandbox = name, error = %e, "exec failed");
                ProcessOutput::failed(format!("{:#}", e))
            }
            Err(_) => {
                warn!(sandbox = name, timeout_secs = timeout.as_secs_f64(), "exec timed out");
                ProcessOutput {
                    timed_out: true,
                    ..ProcessOutput::failed(timeout_message(timeout))
                }
            }
        };

        self.touch(name);
        output
    }

    /// Stop and remove one sandbox and forget its last-use marker
    pub async fn shutdown(&self, name: &str) -> Result<()> {
        info!(sandbox = name, "Shutting down sandbox");
        self.runtime
            .remove(name)
            .await
            .map_err(|source| EngineError::Runtime { source })?;
        self.clear_sentinel(name);
        Ok(())
    }

    /// Shut down every running sandbox whose name starts with `prefix`.
    ///
    /// Markers left behind by sandboxes that already exited are removed
    /// too. Returns the names of the sandboxes that were running.
    pub async fn shutdown_all(&self, prefix: &str) -> Result<Vec<String>> {
        let running = self
            .runtime
            .list_running(prefix)
            .await
            .map_err(|source| EngineError::Runtime { source })?;

        for name in &running {
            if let Err(e) = self.shutdown(name).await {
                warn!(sandbox = %name, error = %e, "Failed to shut down sandbox");
            }
        }

        for orphan in self.sentinel_names(prefix) {
            if !running.contains(&orphan) {
                debug!(sandbox = %orphan, "Removing orphaned last-use marker");
                self.clear_sentinel(&orphan);
            }
        }

        Ok(running)
    }

    /// When `name` was last used, if it has a marker
    pub fn last_used(&self, name: &str) -> Option<DateTime<Utc>> {
        let path = sentinel_path(&self.state_dir, name);
        let content = fs::read_to_string(&path).ok()?;
        match DateTime::parse_from_rfc3339(content.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            // Unreadable timestamp: fall back to when the marker was written
            Err(_) => fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from),
        }
    }

    /// Running sandboxes with `prefix` unused for longer than `max_idle`.
    /// A running sandbox without a marker counts as idle.
    pub async fn idle_sandboxes(&self, prefix: &str, max_idle: Duration) -> Result<Vec<String>> {
        let running = self
            .runtime
            .list_running(prefix)
            .await
            .map_err(|source| EngineError::Runtime { source })?;

        let now = Utc::now();
        Ok(running
            .into_iter()
            .filter(|name| match self.last_used(name) {
                Some(ts) => (now - ts).to_std().map(|idle| idle > max_idle).unwrap_or(false),
                None => true,
            })
            .collect())
    }

    /// Shut down the sandboxes `idle_sandboxes` reports
    pub async fn reap_idle(&self, prefix: &str, max_idle: Duration) -> Result<Vec<String>> {
        let idle = self.idle_sandboxes(prefix, max_idle).await?;
        for name in &idle {
            info!(sandbox = %name, max_idle_secs = max_idle.as_secs(), "Reaping idle sandbox");
            self.shutdown(name).await?;
        }
        Ok(idle)
    }

    async fn healthy(&self, name: &str) -> bool {
        let check = ["echo".to_string(), "ok".to_string()];
        let output = self.exec_untracked(name, &check, HEALTH_CHECK_TIMEOUT).await;
        output.success() && output.stdout.trim() == "ok"
    }

    async fn exec_untracked(&self, name: &str, command: &[String], timeout: Duration) -> ProcessOutput {
        match tokio::time::timeout(timeout, self.runtime.exec(name, command, None, None)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => ProcessOutput::failed(e.to_string()),
            Err(_) => ProcessOutput::failed(timeout_message(timeout)),
        }
    }

    /// Refresh the last-use marker; failures only cost idle tracking
    fn touch(&self, name: &str) {
        let path = sentinel_path(&self.state_dir, name);
        let write = fs::create_dir_all(&self.state_dir)
            .and_then(|_| fs::write(&path, Utc::now().to_rfc3339()));
        if let Err(e) = write {
            warn!(path = %path.display(), error = %e, "Failed to update last-use marker");
        }
    }

    fn clear_sentinel(&self, name: &str) {
        let path = sentinel_path(&self.state_dir, name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove last-use marker"),
        }
    }

    fn sentinel_names(&self, prefix: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.state_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let file_name = file_name.to_str()?;
                sandbox_from_sentinel(file_name, prefix).map(str::to_string)
            })
            .collect()
    }
}

fn timeout_message(timeout: Duration) -> String {
    let secs = timeout.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("Command timed out after {} seconds", timeout.as_secs())
    } else {
        format!("Command timed out after {} seconds", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use benchbox_common::naming::SANDBOX_PREFIX;
    use benchbox_common::types::Language;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn controller(runtime: Arc<FakeRuntime>, state: &TempDir) -> SandboxController {
        let config = EngineConfig {
            state_dir: state.path().to_path_buf(),
            ..EngineConfig::default()
        };
        SandboxController::new(runtime, &config)
    }

    #[tokio::test]
    async fn test_ensure_image_builds_once() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let sandboxes = controller(runtime.clone(), &state);

        sandboxes.ensure_image(&Language::Python).await.unwrap();
        sandboxes.ensure_image(&Language::Python).await.unwrap();

        assert_eq!(runtime.build_calls.load(Ordering::SeqCst), 1);
        assert!(runtime.has_image(Language::Python.image()));
    }

    #[tokio::test]
    async fn test_ensure_image_build_failure() {
        let runtime = Arc::new(FakeRuntime::new().with_build_result(1, "pull access denied"));
        let state = TempDir::new().unwrap();
        let sandboxes = controller(runtime, &state);

        let err = sandboxes.ensure_image(&Language::Go).await.unwrap_err();
        match err {
            EngineError::ImageBuild { image, exit_code, stderr } => {
                assert_eq!(image, Language::Go.image());
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "pull access denied");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_ensure_warm_starts_once_and_touches() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let sandboxes = controller(runtime.clone(), &state);

        sandboxes
            .ensure_warm(&Language::Python, workdir.path(), "benchbox-a")
            .await
            .unwrap();
        sandboxes
            .ensure_warm(&Language::Python, workdir.path(), "benchbox-a")
            .await
            .unwrap();

        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);
        let spec = runtime.started_spec("benchbox-a").unwrap();
        assert_eq!(spec.mount_point, MOUNT_POINT);
        assert_eq!(spec.sleep_secs, 3600);
        assert!(spec.env.is_empty());
        assert!(sandboxes.last_used("benchbox-a").is_some());
    }

    #[tokio::test]
    async fn test_ensure_warm_restarts_unhealthy_sandbox() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let sandboxes = controller(runtime.clone(), &state);

        sandboxes
            .ensure_warm(&Language::Go, workdir.path(), "benchbox-b")
            .await
            .unwrap();
        runtime.set_healthy(false);
        let err = sandboxes
            .ensure_warm(&Language::Go, workdir.path(), "benchbox-b")
            .await
            .unwrap_err();

        // Restarted, then still failed the health check
        assert!(matches!(err, EngineError::SandboxStart { .. }));
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.remove_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ensure_warm_clears_stopped_container() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let sandboxes = controller(runtime.clone(), &state);

        runtime.leave_stopped("benchbox-f");
        sandboxes
            .ensure_warm(&Language::Python, workdir.path(), "benchbox-f")
            .await
            .unwrap();

        assert!(runtime.is_marked_running("benchbox-f"));
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.remove_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_dir_mounted_with_env() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let config = EngineConfig {
            state_dir: state.path().to_path_buf(),
            cache_dir: Some(cache.path().join("shared")),
            ..EngineConfig::default()
        };
        let sandboxes = SandboxController::new(runtime.clone(), &config);

        sandboxes
            .ensure_warm(&Language::JavaScript, workdir.path(), "benchbox-c")
            .await
            .unwrap();

        let spec = runtime.started_spec("benchbox-c").unwrap();
        assert_eq!(spec.cache_dir, Some(cache.path().join("shared")));
        assert_eq!(spec.env, vec!["npm_config_cache=/cache/npm".to_string()]);
        assert!(cache.path().join("shared").is_dir());
    }

    #[tokio::test]
    async fn test_exec_timeout_never_raises() {
        let runtime = Arc::new(FakeRuntime::new().with_exec_delay(Duration::from_millis(500)));
        let state = TempDir::new().unwrap();
        let sandboxes = controller(runtime, &state);

        let out = sandboxes
            .exec(
                "benchbox-d",
                &["sleep".to_string(), "5".to_string()],
                None,
                None,
                Duration::from_millis(20),
            )
            .await;

        assert!(out.timed_out);
        assert_eq!(out.exit_code, -1);
        assert!(out.stderr.starts_with("Command timed out after"));
    }

    #[tokio::test]
    async fn test_exec_runtime_error_becomes_output() {
        let runtime = Arc::new(FakeRuntime::new().with_exec_error("no such container"));
        let state = TempDir::new().unwrap();
        let sandboxes = controller(runtime, &state);

        let out = sandboxes
            .exec("benchbox-e", &["true".to_string()], None, None, Duration::from_secs(1))
            .await;

        assert_eq!(out.exit_code, -1);
        assert!(!out.timed_out);
        assert!(out.stderr.contains("no such container"));
    }

    #[tokio::test]
    async fn test_shutdown_all_collects_orphan_markers() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let sandboxes = controller(runtime.clone(), &state);

        runtime.mark_running("benchbox-live");
        fs::write(sentinel_path(state.path(), "benchbox-live"), Utc::now().to_rfc3339()).unwrap();
        fs::write(sentinel_path(state.path(), "benchbox-gone"), Utc::now().to_rfc3339()).unwrap();
        fs::write(sentinel_path(state.path(), "other-tool"), "keep").unwrap();

        let stopped = sandboxes.shutdown_all(SANDBOX_PREFIX).await.unwrap();

        assert_eq!(stopped, vec!["benchbox-live".to_string()]);
        assert!(!runtime.is_marked_running("benchbox-live"));
        assert!(!sentinel_path(state.path(), "benchbox-live").exists());
        assert!(!sentinel_path(state.path(), "benchbox-gone").exists());
        assert!(sentinel_path(state.path(), "other-tool").exists());
    }

    #[tokio::test]
    async fn test_reap_idle_only_stale_sandboxes() {
        let runtime = Arc::new(FakeRuntime::new());
        let state = TempDir::new().unwrap();
        let sandboxes = controller(runtime.clone(), &state);

        runtime.mark_running("benchbox-fresh");
        runtime.mark_running("benchbox-stale");
        runtime.mark_running("benchbox-unknown");
        let stale = Utc::now() - chrono::Duration::hours(2);
        fs::write(sentinel_path(state.path(), "benchbox-fresh"), Utc::now().to_rfc3339()).unwrap();
        fs::write(sentinel_path(state.path(), "benchbox-stale"), stale.to_rfc3339()).unwrap();

        let mut reaped = sandboxes
            .reap_idle(SANDBOX_PREFIX, Duration::from_secs(3600))
            .await
            .unwrap();
        reaped.sort();

        assert_eq!(reaped, vec!["benchbox-stale".to_string(), "benchbox-unknown".to_string()]);
        assert!(runtime.is_marked_running("benchbox-fresh"));
        assert!(!sentinel_path(state.path(), "benchbox-stale").exists());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            timeout_message(Duration::from_secs(10)),
            "Command timed out after 10 seconds"
        );
        assert_eq!(
            timeout_message(Duration::from_millis(1500)),
            "Command timed out after 1.5 seconds"
        );
    }
}
