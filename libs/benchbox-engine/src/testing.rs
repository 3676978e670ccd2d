// In-memory container runtime for unit tests
// Records every call so tests can assert on idempotence and ordering

use crate::runtime::{ContainerRuntime, ProcessOutput, SandboxSpec};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the fake saw for one non-health-check exec
#[derive(Debug, Clone)]
pub struct FakeExec {
    pub sandbox: String,
    pub command: Vec<String>,
    pub workdir: Option<String>,
    /// Host directory mounted into the sandbox, if it was started by the fake
    pub host_workdir: Option<PathBuf>,
}

type ExecHandler = Box<dyn Fn(&FakeExec) -> ProcessOutput + Send + Sync>;

pub struct FakeRuntime {
    pub build_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    images: Mutex<HashSet<String>>,
    running: Mutex<HashSet<String>>,
    stopped: Mutex<HashSet<String>>,
    specs: Mutex<HashMap<String, SandboxSpec>>,
    execs: Mutex<Vec<FakeExec>>,
    healthy: AtomicBool,
    build_result: (i64, String),
    exec_delay: Option<Duration>,
    exec_error: Option<String>,
    handler: ExecHandler,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            build_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            images: Mutex::new(HashSet::new()),
            running: Mutex::new(HashSet::new()),
            stopped: Mutex::new(HashSet::new()),
            specs: Mutex::new(HashMap::new()),
            execs: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            build_result: (0, String::new()),
            exec_delay: None,
            exec_error: None,
            handler: Box::new(|_| ProcessOutput::default()),
        }
    }

    pub fn with_build_result(mut self, exit_code: i64, stderr: &str) -> Self {
        self.build_result = (exit_code, stderr.to_string());
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub fn with_exec_error(mut self, message: &str) -> Self {
        self.exec_error = Some(message.to_string());
        self
    }

    /// Answer non-health-check execs with `handler`
    pub fn with_exec_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FakeExec) -> ProcessOutput + Send + Sync + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn mark_running(&self, name: &str) {
        self.running.lock().unwrap().insert(name.to_string());
    }

    /// A stopped container that still holds `name`; starting over it conflicts
    pub fn leave_stopped(&self, name: &str) {
        self.stopped.lock().unwrap().insert(name.to_string());
    }

    pub fn is_marked_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.images.lock().unwrap().contains(image)
    }

    pub fn started_spec(&self, name: &str) -> Option<SandboxSpec> {
        self.specs.lock().unwrap().get(name).cloned()
    }

    pub fn execs(&self) -> Vec<FakeExec> {
        self.execs.lock().unwrap().clone()
    }
}

fn is_health_check(command: &[String]) -> bool {
    command.len() == 2 && command[0] == "echo" && command[1] == "ok"
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.has_image(image))
    }

    async fn build_image(&self, image: &str, _dockerfile: &str) -> Result<ProcessOutput> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        let (exit_code, stderr) = self.build_result.clone();
        if exit_code == 0 {
            self.images.lock().unwrap().insert(image.to_string());
        }
        Ok(ProcessOutput {
            stdout: String::new(),
            stderr,
            exit_code,
            timed_out: false,
        })
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.is_marked_running(name))
    }

    async fn start(&self, spec: &SandboxSpec) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.stopped.lock().unwrap().contains(&spec.name) {
            return Err(anyhow!("Conflict. The container name \"/{}\" is already in use", spec.name));
        }
        self.mark_running(&spec.name);
        self.specs
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn exec(
        &self,
        name: &str,
        command: &[String],
        workdir: Option<&str>,
        _stdin: Option<&str>,
    ) -> Result<ProcessOutput> {
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.exec_error {
            return Err(anyhow!("{}", message));
        }

        if is_health_check(command) {
            if self.healthy.load(Ordering::SeqCst) && self.is_marked_running(name) {
                return Ok(ProcessOutput {
                    stdout: "ok\n".to_string(),
                    ..ProcessOutput::default()
                });
            }
            return Ok(ProcessOutput::failed("unhealthy"));
        }

        let exec = FakeExec {
            sandbox: name.to_string(),
            command: command.to_vec(),
            workdir: workdir.map(str::to_string),
            host_workdir: self.started_spec(name).map(|s| s.host_workdir),
        };
        let output = (self.handler)(&exec);
        self.execs.lock().unwrap().push(exec);
        Ok(output)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.running.lock().unwrap().remove(name);
        self.stopped.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .running
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
