//! Hot-reload engine for relink modules.
//!
//! Accepts change-sets of script archives at any time, resolves their
//! dependencies, compiles each inside its own isolation boundary through a
//! registered compiler plugin, and publishes the successful builds as one
//! atomic registry snapshot. A module that fails to build keeps its last
//! published revision, and so does everything depending on it.
//!
//! # Architecture
//!
//! - **Resolver**: dependency graph, cycle detection, build tiers.
//! - **Boundary builder**: per-build visibility from core, flattened
//!   dependencies, declared plugin runtimes, filtered host symbols.
//! - **Dispatch**: plugin selection and timed, isolated backend runs.
//! - **Loader**: serialized reload cycles and the commit step.
//! - **Registry**: lock-free snapshot reads.

pub mod boundary;
pub mod cancel;
pub mod config;
pub mod core_api;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod listener;
pub mod loader;
pub mod module;
pub mod registry;
pub mod report;
pub mod resolver;

// Re-exports for convenience.
pub use boundary::BoundaryBuilder;
pub use cancel::CancelToken;
pub use config::LoaderConfig;
pub use core_api::{core_symbols, CORE_NAMESPACE, RUNTIME_VERSION};
pub use dispatch::PluginTable;
pub use error::{
    CompilationCause, CompilationError, CycleError, LoaderError, ReloadError, Result,
};
pub use executor::{ExecutionStats, ModuleExecutor};
pub use listener::ModuleListener;
pub use loader::{ChangeSet, ModuleLoader, ModuleLoaderBuilder};
pub use module::CompiledModule;
pub use registry::{ModuleRegistry, Snapshot};
pub use report::{ModuleOutcome, ReloadReport};
pub use resolver::{resolve, DependencyGraph, Resolution};
