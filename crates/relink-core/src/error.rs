//! Core error types.

use std::path::PathBuf;

use crate::id::ModuleId;

/// Errors raised while constructing identities, specs and archives.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed module identifier.
    #[error("invalid module id '{id}': {reason}")]
    InvalidModuleId { id: String, reason: String },

    /// Malformed plugin identifier.
    #[error("invalid plugin id '{id}': {reason}")]
    InvalidPluginId { id: String, reason: String },

    /// Malformed symbol name.
    #[error("invalid symbol name '{name}': {reason}")]
    InvalidSymbolName { name: String, reason: String },

    /// A spec lists its own module as a dependency.
    #[error("module '{0}' declares a dependency on itself")]
    SelfDependency(ModuleId),

    /// Archive entry names are relative `/`-separated paths.
    #[error("invalid archive entry name '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    /// Two archive entries share a name.
    #[error("duplicate archive entry '{0}'")]
    DuplicateEntry(String),

    /// Two definitions of the same symbol in one table.
    #[error("duplicate symbol '{0}'")]
    DuplicateSymbol(String),

    /// A module spec file could not be interpreted.
    #[error("invalid module spec: {detail}")]
    InvalidSpec { detail: String },

    /// Archive directory could not be read.
    #[error("cannot read archive at {path}: {detail}")]
    ArchiveRead { path: PathBuf, detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Semver parse error.
    #[error("invalid version: {0}")]
    Semver(#[from] semver::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by a single symbol invocation.
///
/// None of these affect the registry; they end the invocation that raised
/// them and nothing else.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// The symbol is outside the module's isolation boundary.
    #[error("module '{module}' cannot see symbol '{symbol}'")]
    IsolationViolation { module: ModuleId, symbol: String },

    /// A constant was called with arguments.
    #[error("symbol '{0}' is a constant and takes no arguments")]
    NotCallable(String),

    /// Wrong number of arguments.
    #[error("symbol '{symbol}' expects {expected} argument(s), got {actual}")]
    Arity {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    /// The callee reported a failure.
    #[error("call to '{symbol}' failed: {message}")]
    Failed { symbol: String, message: String },
}

/// A backend's report that one archive could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.render())]
pub struct BuildFailure {
    /// What went wrong.
    pub message: String,
    /// Archive entry the failure points at, if known.
    pub entry: Option<String>,
    /// One-based line within the entry, if known.
    pub line: Option<usize>,
}

impl BuildFailure {
    /// A failure not tied to a particular entry.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            entry: None,
            line: None,
        }
    }

    /// Attach the entry the failure was found in.
    pub fn in_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Attach a line number.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    fn render(&self) -> String {
        match (&self.entry, self.line) {
            (Some(entry), Some(line)) => format!("{entry}:{line}: {}", self.message),
            (Some(entry), None) => format!("{entry}: {}", self.message),
            _ => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failure_renders_location() {
        let f = BuildFailure::new("unexpected token").in_entry("a.rls").at_line(3);
        assert_eq!(f.to_string(), "a.rls:3: unexpected token");
        assert_eq!(BuildFailure::new("boom").to_string(), "boom");
    }

    #[test]
    fn isolation_violation_names_module_and_symbol() {
        let err = InvocationError::IsolationViolation {
            module: ModuleId::parse("app").unwrap(),
            symbol: "pkg.other.X".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("app"));
        assert!(msg.contains("pkg.other.X"));
    }
}
