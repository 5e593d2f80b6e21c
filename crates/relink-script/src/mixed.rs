//! The mixed backend: precompiled tables and scripts in one archive.
//!
//! Constants from `*.symbols.toml` entries are loaded first. `.rls` sources
//! are then compiled on top of them, so scripts can refer to the constants
//! by name, and the module publishes both.

use std::path::Path;
use std::sync::Arc;

use relink_core::{
    BuildFailure, CompilerBackend, CompilerPluginSpec, IsolationBoundary, PluginId,
    ScriptArchive, SymbolTable,
};

use crate::compiler::{runtime_symbols, ScriptCompiler, SOURCE_SUFFIX};
use crate::symbols::{SymbolsLoader, SYMBOLS_SUFFIX};

/// Plugin id the mixed backend registers under.
pub const PLUGIN_ID: &str = "mixed";

/// Builds archives that carry both script sources and symbol tables.
#[derive(Debug, Clone, Default)]
pub struct MixedCompiler {
    scripts: ScriptCompiler,
    tables: SymbolsLoader,
}

impl MixedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link checking for the script half.
    pub fn with_link_check(mut self, enabled: bool) -> Self {
        self.scripts = self.scripts.with_link_check(enabled);
        self
    }

    pub fn plugin_spec(self) -> relink_core::Result<CompilerPluginSpec> {
        self.plugin_spec_with_id(PluginId::new(PLUGIN_ID)?)
    }

    /// Registration under `id`. Scripts built here see the same runtime
    /// library as under the script backend.
    pub fn plugin_spec_with_id(self, id: PluginId) -> relink_core::Result<CompilerPluginSpec> {
        let link_check = self.scripts.link_check();
        Ok(CompilerPluginSpec::new(id, Arc::new(self))
            .with_runtime(runtime_symbols()?)
            .with_metadata("language", "relink-script")
            .with_metadata("suffix", format!("{SOURCE_SUFFIX} {SYMBOLS_SUFFIX}"))
            .with_metadata("link-check", link_check.to_string()))
    }

    /// Load the archive's tables, then compile its scripts against them.
    pub fn compile(
        &self,
        archive: &ScriptArchive,
        boundary: &IsolationBoundary,
    ) -> Result<SymbolTable, BuildFailure> {
        let constants = self.tables.load(archive)?;
        let loaded = constants.len();
        let table = self.scripts.compile_with(archive, boundary, constants)?;
        tracing::debug!(
            module = %archive.id(),
            constants = loaded,
            functions = table.len() - loaded,
            "compiled mixed archive"
        );
        Ok(table)
    }
}

impl CompilerBackend for MixedCompiler {
    fn claims(&self, archive: &ScriptArchive) -> bool {
        self.scripts.claims(archive) || self.tables.claims(archive)
    }

    fn build(
        &self,
        archive: &ScriptArchive,
        boundary: &IsolationBoundary,
        _scratch: &Path,
    ) -> Result<SymbolTable, BuildFailure> {
        self.compile(archive, boundary)
    }
}
