//! Shared model for the relink module runtime.
//!
//! Defines the value types every other relink crate speaks in: module and
//! plugin identities, module specs, script archives, symbols, isolation
//! boundaries and execution environments, plus the contract compiler
//! backends implement.
//!
//! # Architecture
//!
//! - **Archives** are immutable inputs: entries plus a [`ModuleSpec`].
//! - **Backends** turn an archive into a [`SymbolTable`] while looking only
//!   through the [`IsolationBoundary`] computed for that build.
//! - **Environments** pair a boundary with a module's own symbols and are the
//!   only way compiled code reaches anything else.

pub mod archive;
pub mod environment;
pub mod error;
pub mod hash;
pub mod id;
pub mod plugin;
pub mod spec;
pub mod symbol;

// Re-exports for convenience.
pub use archive::{ScriptArchive, ScriptArchiveBuilder, SPEC_FILE_NAME};
pub use environment::{ExecutionEnvironment, IsolationBoundary, LinkedModule, Origin, Resolved};
pub use error::{BuildFailure, CoreError, InvocationError, Result};
pub use hash::ContentHash;
pub use id::{ModuleId, PluginId};
pub use plugin::{CompilerBackend, CompilerPluginSpec};
pub use spec::{ModuleSpec, ModuleSpecBuilder};
pub use symbol::{display_value, within_namespace, Callable, Symbol, SymbolBody, SymbolTable, Value};
