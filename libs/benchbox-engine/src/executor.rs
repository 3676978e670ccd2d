/// Execution Orchestrator - High-Level Batch Execution
///
/// **Responsibility:**
/// Coordinate adapter, sandbox controller, demultiplexer and evaluator.
///
/// **Architecture:**
/// 1. Resolve the adapter from the registry
/// 2. Ensure image and warm sandbox (sandbox.rs)
/// 3. Write inputs and driver into the workdir, build if needed
/// 4. Run the driver once for the whole batch
/// 5. Split its output into per-case outcomes (demux.rs)
/// 6. Judge or aggregate them (evaluator.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How containers run (runtime's job)
/// - What the driver prints (adapter's and demux's job)

use crate::adapters::AdapterRegistry;
use crate::demux::demultiplex;
use crate::error::{EngineError, Result};
use crate::evaluator;
use crate::protocol::INPUTS_FILENAME;
use crate::runtime::ContainerRuntime;
use crate::sandbox::{SandboxController, MOUNT_POINT};
use benchbox_common::config::EngineConfig;
use benchbox_common::naming::sandbox_name;
use benchbox_common::types::{
    CallArgs, CaseOutcome, CaseProfile, CaseStatus, TestCase, TestReport,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Where a solution lives and which function to call
#[derive(Debug, Clone)]
pub struct BatchTarget {
    pub platform: String,
    /// Problem path within the platform, part of the sandbox identity
    pub problem: String,
    /// Host directory holding the solution file; mounted into the sandbox
    pub workdir: PathBuf,
    pub function_name: String,
}

/// Files written into the workdir for one batch, removed on drop
struct WorkspaceFiles {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl WorkspaceFiles {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            files: Vec::new(),
        }
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<()> {
        let path = self.dir.join(name);
        // Track first so a partial write is still cleaned up
        self.files.push(path.clone());
        fs::write(&path, contents).map_err(|source| EngineError::Workspace { path, source })
    }

    /// Remove `name` on drop without writing it
    fn track(&mut self, name: &str) {
        self.files.push(self.dir.join(name));
    }
}

impl Drop for WorkspaceFiles {
    fn drop(&mut self) {
        for path in &self.files {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to clean up workspace file"),
            }
        }
    }
}

pub struct Orchestrator {
    registry: AdapterRegistry,
    sandboxes: SandboxController,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(registry: AdapterRegistry, runtime: Arc<dyn ContainerRuntime>, config: EngineConfig) -> Self {
        let sandboxes = SandboxController::new(runtime, &config);
        Self {
            registry,
            sandboxes,
            config,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn sandboxes(&self) -> &SandboxController {
        &self.sandboxes
    }

    /// Run every call in `request` through one driver invocation.
    ///
    /// Always yields one outcome per call, in order, unless the sandbox
    /// itself could not be prepared.
    #[tracing::instrument(
        skip(self, target, request),
        fields(platform = %target.platform, problem = %target.problem, cases = request.len())
    )]
    pub async fn run_batch(
        &self,
        language: &str,
        target: &BatchTarget,
        request: &[CallArgs],
    ) -> Result<Vec<CaseOutcome>> {
        let adapter = self.registry.resolve(language)?;
        if request.is_empty() {
            return Ok(Vec::new());
        }

        let solution = target.workdir.join(adapter.solution_filename());
        if !solution.is_file() {
            return Err(EngineError::Workspace {
                path: solution,
                source: io::Error::new(io::ErrorKind::NotFound, "solution file not found"),
            });
        }

        self.sandboxes.ensure_image(adapter.as_ref()).await?;

        let name = sandbox_name(
            &target.platform,
            &target.problem,
            adapter.name(),
            adapter.image(),
        );
        self.sandboxes
            .ensure_warm(adapter.as_ref(), &target.workdir, &name)
            .await?;

        let inputs = serde_json::to_string(request).map_err(|source| EngineError::EncodeInputs { source })?;
        let mut files = WorkspaceFiles::new(&target.workdir);
        files.write(INPUTS_FILENAME, &inputs)?;
        files.write(
            adapter.driver_filename(),
            &adapter.generate_batch_driver(&target.function_name),
        )?;
        for artifact in adapter.build_artifacts() {
            files.track(artifact);
        }

        if let Some(build) = adapter.build_command() {
            info!(sandbox = %name, "Building driver");
            let output = self
                .sandboxes
                .exec(&name, &build, Some(MOUNT_POINT), None, self.config.build_timeout())
                .await;

            if !output.success() {
                let diagnostic = [output.stderr.trim(), output.stdout.trim()]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                warn!(exit_code = output.exit_code, "Build failed; every case fails");
                return Ok(request
                    .iter()
                    .map(|_| CaseOutcome::failure(CaseStatus::BuildFailed, diagnostic.clone(), output.exit_code))
                    .collect());
            }
        }

        let started = Instant::now();
        let output = self
            .sandboxes
            .exec(
                &name,
                &adapter.run_command(),
                Some(MOUNT_POINT),
                None,
                self.config.run_timeout(),
            )
            .await;

        let outcomes = demultiplex(adapter.as_ref(), &output, request.len());
        info!(
            sandbox = %name,
            exit_code = output.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
            "Batch finished"
        );
        Ok(outcomes)
    }

    /// Test mode: run the numbered cases as one batch and judge each result
    pub async fn run_tests(
        &self,
        language: &str,
        target: &BatchTarget,
        cases: &[(usize, TestCase)],
    ) -> Result<TestReport> {
        let started = Instant::now();
        let request: Vec<CallArgs> = cases.iter().map(|(_, tc)| tc.input.clone()).collect();

        let outcomes = self.run_batch(language, target, &request).await?;
        let report = evaluator::evaluate(cases, outcomes, started.elapsed().as_millis() as u64);

        info!(passed = report.passed, total = report.total, "Test run complete");
        Ok(report)
    }

    /// Profile mode for one input: run it `iterations` times in one batch.
    ///
    /// The first failing replicate aborts aggregation and its error is
    /// reported instead of statistics.
    pub async fn profile_case(
        &self,
        language: &str,
        target: &BatchTarget,
        case_num: usize,
        args: &CallArgs,
        iterations: usize,
    ) -> Result<CaseProfile> {
        let request = vec![args.clone(); iterations.max(1)];
        let outcomes = self.run_batch(language, target, &request).await?;

        if let Some(failed) = outcomes.iter().find(|o| !o.is_ok()) {
            return Ok(CaseProfile {
                case_num,
                stdout: failed.stdout.clone(),
                error: failed.error.clone(),
                stats: None,
            });
        }

        Ok(CaseProfile {
            case_num,
            stdout: outcomes.last().map(|o| o.stdout.clone()).unwrap_or_default(),
            error: None,
            stats: Some(evaluator::aggregate_profile(&outcomes)),
        })
    }

    /// Profile every numbered input.
    ///
    /// Failures stay with their input; only an image build failure
    /// (which no input can recover from) aborts the whole run.
    pub async fn profile(
        &self,
        language: &str,
        target: &BatchTarget,
        inputs: &[(usize, CallArgs)],
        iterations: usize,
    ) -> Result<Vec<CaseProfile>> {
        let mut profiles = Vec::with_capacity(inputs.len());
        for (case_num, args) in inputs {
            match self.profile_case(language, target, *case_num, args, iterations).await {
                Ok(profile) => profiles.push(profile),
                Err(e @ (EngineError::ImageBuild { .. } | EngineError::UnknownLanguage { .. })) => {
                    return Err(e)
                }
                Err(e) => {
                    warn!(case_num, error = %e, "Profiling failed for input");
                    profiles.push(CaseProfile {
                        case_num: *case_num,
                        stdout: String::new(),
                        error: Some(e.to_string()),
                        stats: None,
                    });
                }
            }
        }
        Ok(profiles)
    }
}
