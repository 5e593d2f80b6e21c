//! Loader error types.
//!
//! [`ReloadError`] describes why one module was left out of a commit. It is
//! collected into the cycle's report and never aborts the cycle.
//! [`LoaderError`] covers setup problems found before any cycle runs.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use relink_core::{BuildFailure, CoreError, ModuleId, PluginId};

/// A strongly connected set of modules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency cycle: {}", format_cycle(&self.path, &self.members))]
pub struct CycleError {
    /// One loop through the component; the first member closes it.
    pub path: Vec<ModuleId>,
    /// Every module in the component, sorted.
    pub members: Vec<ModuleId>,
}

impl CycleError {
    /// Whether `id` is part of the cycle.
    pub fn involves(&self, id: &ModuleId) -> bool {
        self.members.contains(id)
    }
}

fn format_cycle(path: &[ModuleId], members: &[ModuleId]) -> String {
    let mut parts: Vec<String> = path.iter().map(ToString::to_string).collect();
    if let Some(first) = path.first() {
        parts.push(first.to_string());
    }
    let mut out = parts.join(" -> ");
    if members.len() > path.len() {
        let all: Vec<String> = members.iter().map(ToString::to_string).collect();
        out.push_str(&format!(" (component: {})", all.join(", ")));
    }
    out
}

/// Why a backend invocation produced no module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationCause {
    /// The backend reported a failure.
    Backend(BuildFailure),
    /// The backend did not return within the configured bound.
    Timeout { after: Duration },
    /// The backend panicked.
    Panicked { message: String },
    /// The scratch directory or build thread could not be created.
    Setup { detail: String },
}

impl fmt::Display for CompilationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationCause::Backend(failure) => write!(f, "{failure}"),
            CompilationCause::Timeout { after } => {
                write!(f, "timed out after {}ms", after.as_millis())
            }
            CompilationCause::Panicked { message } => write!(f, "backend panicked: {message}"),
            CompilationCause::Setup { detail } => write!(f, "build setup failed: {detail}"),
        }
    }
}

/// A compilation failure scoped to one archive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("compilation of '{module}' failed: {cause}")]
pub struct CompilationError {
    pub module: ModuleId,
    /// The plugin that was building, if one claimed the archive.
    pub plugin: Option<PluginId>,
    pub cause: CompilationCause,
}

/// Why a module was not published in a reload cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    /// A declared dependency is not in the full spec set.
    #[error("module '{module}' depends on '{missing}', which is not loaded")]
    UnresolvedDependency { module: ModuleId, missing: ModuleId },

    /// A dependency was rejected or failed to build in the same cycle.
    #[error("module '{module}' depends on '{dependency}', which failed this cycle")]
    DependencyFailed {
        module: ModuleId,
        dependency: ModuleId,
    },

    /// The module is part of a dependency cycle.
    #[error(transparent)]
    Cycle(CycleError),

    /// The spec names a compiler plugin nobody registered.
    #[error("module '{module}' declares unknown compiler plugin '{plugin}'")]
    UnknownPlugin { module: ModuleId, plugin: PluginId },

    /// The backend failed, timed out or panicked.
    #[error(transparent)]
    Compilation(CompilationError),
}

impl ReloadError {
    /// Whether this error came from the backend rather than from resolution.
    pub fn is_compilation(&self) -> bool {
        matches!(self, ReloadError::Compilation(_))
    }
}

/// Errors raised while configuring a loader.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Two plugins registered under one id.
    #[error("compiler plugin '{0}' is already registered")]
    DuplicatePlugin(PluginId),

    /// Configuration values out of range.
    #[error("invalid loader configuration: {detail}")]
    InvalidConfig { detail: String },

    /// The scratch root could not be created.
    #[error("cannot create scratch root {path}: {source}")]
    ScratchRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Core model error (e.g. building the core symbol table).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for loader setup.
pub type Result<T> = std::result::Result<T, LoaderError>;
