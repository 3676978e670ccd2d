//! Sandboxed batch execution engine.
//!
//! Runs a user solution against a batch of inputs inside a warm container,
//! one driver process per batch, and splits its output back into ordered
//! per-case outcomes.

pub mod adapters;
pub mod demux;
pub mod docker;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod protocol;
pub mod runtime;
pub mod sandbox;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod testing;

pub use adapters::{AdapterRegistry, LanguageAdapter};
pub use docker::DockerRuntime;
pub use error::EngineError;
pub use executor::{BatchTarget, Orchestrator};
pub use runtime::{ContainerRuntime, ProcessOutput};
pub use sandbox::SandboxController;
