/// Language Adapters - everything language-specific about running a batch
///
/// **Responsibility:**
/// - Image reference and Dockerfile text for the language's sandbox
/// - Solution template and generated batch driver source
/// - Build step (if any) and driver invocation
/// - Decoding one protocol chunk into a `CaseOutcome`
///
/// **Boundary:**
/// Adapters never touch containers. The orchestrator hands their output to
/// the sandbox controller and the demultiplexer.

pub mod go;
pub mod javascript;
pub mod python;

use crate::error::{EngineError, Result};
use crate::protocol::{self, ChunkLayout, Markers, MARKERS};
use benchbox_common::types::{CaseOutcome, CaseStatus, Language};
use std::sync::Arc;

pub trait LanguageAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn image(&self) -> &str;

    fn dockerfile(&self) -> &str;

    fn solution_filename(&self) -> &str;

    fn driver_filename(&self) -> &str;

    fn markers(&self) -> &Markers {
        &MARKERS
    }

    fn chunk_layout(&self) -> ChunkLayout;

    fn solution_template(&self, function_name: &str) -> String;

    fn generate_batch_driver(&self, function_name: &str) -> String;

    /// Command producing a runnable artifact, `None` for interpreted languages
    fn build_command(&self) -> Option<Vec<String>> {
        None
    }

    fn run_command(&self) -> Vec<String>;

    /// Files the build step leaves in the workdir
    fn build_artifacts(&self) -> &[&str] {
        &[]
    }

    /// Toolchain cache variables as `(env var, subdirectory of the cache mount)`
    fn cache_env(&self) -> &[(&str, &str)] {
        &[]
    }

    /// Decode one chunk of driver output.
    ///
    /// A call that raised is correlated with its stderr line by `index`;
    /// the inline error (if the driver sent one) is only a fallback.
    fn decode_chunk(&self, chunk: &str, stderr: &str, index: usize) -> CaseOutcome {
        let markers = self.markers();
        match protocol::decode_chunk(self.chunk_layout(), chunk, markers) {
            Ok(case) if case.call_failed() => {
                let error = protocol::tagged_call_error(stderr, markers, index)
                    .map(str::to_string)
                    .or(case.inline_error)
                    .unwrap_or_else(|| format!("Case {} raised an error", index));
                CaseOutcome {
                    stdout: case.stdout,
                    ..CaseOutcome::failure(CaseStatus::RuntimeError, error, 1)
                }
            }
            Ok(case) => CaseOutcome::success(case.result, case.stdout, case.time_ms, case.mem_delta),
            Err(e) => CaseOutcome::failure(
                CaseStatus::DecodeError,
                format!("Failed to decode output of case {}: {}\nRaw output:\n{}", index, e, chunk.trim()),
                1,
            ),
        }
    }
}

impl LanguageAdapter for Language {
    fn name(&self) -> &str {
        Language::name(self)
    }

    fn aliases(&self) -> &[&str] {
        Language::aliases(self)
    }

    fn image(&self) -> &str {
        match self {
            Language::Python => python::IMAGE,
            Language::Go => go::IMAGE,
            Language::JavaScript => javascript::IMAGE,
        }
    }

    fn dockerfile(&self) -> &str {
        match self {
            Language::Python => python::DOCKERFILE,
            Language::Go => go::DOCKERFILE,
            Language::JavaScript => javascript::DOCKERFILE,
        }
    }

    fn solution_filename(&self) -> &str {
        match self {
            Language::Python => python::SOLUTION_FILENAME,
            Language::Go => go::SOLUTION_FILENAME,
            Language::JavaScript => javascript::SOLUTION_FILENAME,
        }
    }

    fn driver_filename(&self) -> &str {
        match self {
            Language::Python => python::DRIVER_FILENAME,
            Language::Go => go::DRIVER_FILENAME,
            Language::JavaScript => javascript::DRIVER_FILENAME,
        }
    }

    fn chunk_layout(&self) -> ChunkLayout {
        match self {
            Language::Python => ChunkLayout::JsonDocument,
            Language::Go | Language::JavaScript => ChunkLayout::MarkedLines,
        }
    }

    fn solution_template(&self, function_name: &str) -> String {
        match self {
            Language::Python => python::solution_template(function_name),
            Language::Go => go::solution_template(function_name),
            Language::JavaScript => javascript::solution_template(function_name),
        }
    }

    fn generate_batch_driver(&self, function_name: &str) -> String {
        let markers = LanguageAdapter::markers(self);
        match self {
            Language::Python => python::batch_driver(function_name, markers),
            Language::Go => go::batch_driver(function_name, markers),
            Language::JavaScript => javascript::batch_driver(function_name, markers),
        }
    }

    fn build_command(&self) -> Option<Vec<String>> {
        match self {
            Language::Go => Some(go::build_command()),
            Language::Python | Language::JavaScript => None,
        }
    }

    fn run_command(&self) -> Vec<String> {
        match self {
            Language::Python => python::run_command(),
            Language::Go => go::run_command(),
            Language::JavaScript => javascript::run_command(),
        }
    }

    fn build_artifacts(&self) -> &[&str] {
        match self {
            Language::Go => &[go::BINARY_NAME],
            Language::Python | Language::JavaScript => &[],
        }
    }

    fn cache_env(&self) -> &[(&str, &str)] {
        match self {
            Language::Python => python::CACHE_ENV,
            Language::Go => go::CACHE_ENV,
            Language::JavaScript => javascript::CACHE_ENV,
        }
    }
}

/// Adapters available to an orchestrator, looked up by name or alias
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in language
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for lang in Language::ALL {
            registry.register(Arc::new(lang));
        }
        registry
    }

    /// Later registrations shadow earlier ones with the same name or alias
    pub fn register(&mut self, adapter: Arc<dyn LanguageAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn LanguageAdapter>> {
        let wanted = name.trim().to_lowercase();
        self.adapters
            .iter()
            .rev()
            .find(|a| {
                a.name().eq_ignore_ascii_case(&wanted)
                    || a.aliases().iter().any(|alias| alias.eq_ignore_ascii_case(&wanted))
            })
            .cloned()
            .ok_or_else(|| EngineError::UnknownLanguage {
                name: name.to_string(),
                supported: self.names().join(", "),
            })
    }

    /// Registered names in registration order, without duplicates
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for adapter in &self.adapters {
            if !names.iter().any(|n| n == adapter.name()) {
                names.push(adapter.name().to_string());
            }
        }
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LanguageAdapter>> {
        self.adapters.iter()
    }
}
