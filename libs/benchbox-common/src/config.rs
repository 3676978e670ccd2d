// Engine configuration
// Loaded from benchbox.json, with defaults for every field

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "benchbox.json";

pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONTAINER_SLEEP_SECS: u64 = 3600;
pub const DEFAULT_PROFILE_ITERATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for one batch driver invocation
    pub run_timeout_secs: u64,
    /// Upper bound for build steps (image builds and compiled drivers)
    pub build_timeout_secs: u64,
    /// Lifetime of an idle warm sandbox before it exits on its own
    pub container_sleep_secs: u64,
    /// Where last-used sentinel files live
    pub state_dir: PathBuf,
    /// Shared host cache mounted into every sandbox at /cache
    pub cache_dir: Option<PathBuf>,
    pub profile_iterations: usize,
    pub problems_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            container_sleep_secs: DEFAULT_CONTAINER_SLEEP_SECS,
            state_dir: std::env::temp_dir(),
            cache_dir: None,
            profile_iterations: DEFAULT_PROFILE_ITERATIONS,
            problems_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the first config file found, falling back to defaults.
    ///
    /// Search order: explicit path, `./benchbox.json`, `~/.benchbox.json`.
    /// An explicit path that does not exist is an error; the implicit
    /// locations are optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let mut candidates = vec![PathBuf::from(CONFIG_FILENAME)];
                if let Some(home) = std::env::var_os("HOME") {
                    candidates.push(PathBuf::from(home).join(format!(".{}", CONFIG_FILENAME)));
                }
                match candidates.into_iter().find(|p| p.exists()) {
                    Some(path) => Self::load(&path)?,
                    None => Self::default(),
                }
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply BENCHBOX_* environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("BENCHBOX_RUN_TIMEOUT") {
            self.run_timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid BENCHBOX_RUN_TIMEOUT: {}", raw))?;
        }
        if let Some(raw) = lookup("BENCHBOX_STATE_DIR") {
            self.state_dir = PathBuf::from(raw);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.run_timeout_secs == 0 {
            bail!("run_timeout_secs must be greater than zero");
        }
        if self.build_timeout_secs == 0 {
            bail!("build_timeout_secs must be greater than zero");
        }
        if self.profile_iterations == 0 {
            bail!("profile_iterations must be greater than zero");
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}
