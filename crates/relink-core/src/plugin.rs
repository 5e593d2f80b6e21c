//! Compiler backend contract and plugin specifications.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::archive::ScriptArchive;
use crate::environment::IsolationBoundary;
use crate::error::BuildFailure;
use crate::id::PluginId;
use crate::symbol::SymbolTable;

/// A pluggable compiler that turns archives into symbol tables.
///
/// Object-safe so backends can be stored in `Arc<dyn CompilerBackend>`.
pub trait CompilerBackend: fmt::Debug + Send + Sync {
    /// Whether this backend wants to compile `archive`.
    fn claims(&self, archive: &ScriptArchive) -> bool;

    /// Compile `archive`. `boundary` is everything the module may see
    /// besides its own symbols; `scratch` is a private directory for
    /// intermediate output that nobody else writes to.
    fn build(
        &self,
        archive: &ScriptArchive,
        boundary: &IsolationBoundary,
        scratch: &Path,
    ) -> Result<SymbolTable, BuildFailure>;
}

/// Registration of one compiler plugin.
#[derive(Clone)]
pub struct CompilerPluginSpec {
    id: PluginId,
    backend: Arc<dyn CompilerBackend>,
    runtime: Arc<SymbolTable>,
    metadata: BTreeMap<String, String>,
}

impl CompilerPluginSpec {
    pub fn new(id: PluginId, backend: Arc<dyn CompilerBackend>) -> Self {
        Self {
            id,
            backend,
            runtime: Arc::new(SymbolTable::new()),
            metadata: BTreeMap::new(),
        }
    }

    /// Symbols contributed to the boundary of every module declaring this
    /// plugin. Modules that do not declare it never see them.
    pub fn with_runtime(mut self, runtime: SymbolTable) -> Self {
        self.runtime = Arc::new(runtime);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    pub fn backend(&self) -> &Arc<dyn CompilerBackend> {
        &self.backend
    }

    pub fn runtime(&self) -> &Arc<SymbolTable> {
        &self.runtime
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl fmt::Debug for CompilerPluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerPluginSpec")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("runtime", &self.runtime.names().collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .finish()
    }
}
