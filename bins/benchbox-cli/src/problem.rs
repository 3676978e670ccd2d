// Problem metadata store
// <problems_dir>/<platform>/<problem>/testcases.json, solutions in <problem>/<language>/

use anyhow::{bail, Context, Result};
use benchbox_common::types::TestCase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TESTCASES_FILENAME: &str = "testcases.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub function: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemFile {
    #[serde(default)]
    pub testcases: Vec<TestCase>,
    #[serde(default)]
    pub implementations: BTreeMap<String, Implementation>,
}

impl ProblemFile {
    pub fn function_for(&self, language: &str) -> Result<&str> {
        match self.implementations.get(language) {
            Some(imp) => Ok(&imp.function),
            None => bail!(
                "No {} implementation registered; run `benchbox init` with --language {}",
                language,
                language
            ),
        }
    }
}

pub struct ProblemStore {
    root: PathBuf,
}

impl ProblemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn problem_dir(&self, platform: &str, problem: &str) -> PathBuf {
        self.root.join(platform).join(problem)
    }

    /// Directory holding the solution for `language`; mounted into the sandbox
    pub fn solution_dir(&self, platform: &str, problem: &str, language: &str) -> PathBuf {
        self.problem_dir(platform, problem).join(language)
    }

    pub fn load(&self, platform: &str, problem: &str) -> Result<ProblemFile> {
        let path = self.problem_dir(platform, problem).join(TESTCASES_FILENAME);
        if !path.exists() {
            bail!(
                "Problem not found: {} (run `benchbox init {} {}` first)",
                path.display(),
                platform,
                problem
            );
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn load_or_default(&self, platform: &str, problem: &str) -> Result<ProblemFile> {
        let path = self.problem_dir(platform, problem).join(TESTCASES_FILENAME);
        if path.exists() {
            self.load(platform, problem)
        } else {
            Ok(ProblemFile::default())
        }
    }

    pub fn save(&self, platform: &str, problem: &str, file: &ProblemFile) -> Result<()> {
        let dir = self.problem_dir(platform, problem);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(TESTCASES_FILENAME);
        let json = serde_json::to_string_pretty(file).context("Failed to serialize test cases")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Write `contents` unless the file already exists; returns whether it wrote
    pub fn write_solution(&self, dir: &Path, filename: &str, contents: &str) -> Result<bool> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(filename);
        if path.exists() {
            return Ok(false);
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    }
}
