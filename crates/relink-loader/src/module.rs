//! Published modules.

use std::sync::Arc;

use relink_core::{
    ContentHash, ExecutionEnvironment, InvocationError, LinkedModule, ModuleId, ModuleSpec,
    PluginId, Resolved, ScriptArchive, SymbolTable, Value,
};

/// The result of compiling one archive inside its isolation boundary.
///
/// Immutable once published. A later update produces a new value with a
/// higher revision; holders of this one keep seeing the old symbols.
#[derive(Debug)]
pub struct CompiledModule {
    revision: u64,
    archive: Arc<ScriptArchive>,
    environment: ExecutionEnvironment,
    compiler: Option<PluginId>,
}

impl CompiledModule {
    pub(crate) fn new(
        revision: u64,
        archive: Arc<ScriptArchive>,
        environment: ExecutionEnvironment,
        compiler: Option<PluginId>,
    ) -> Self {
        Self {
            revision,
            archive,
            environment,
            compiler,
        }
    }

    pub fn id(&self) -> &ModuleId {
        self.archive.id()
    }

    /// Revision number, starting at 1.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The archive this module was built from.
    pub fn archive(&self) -> &Arc<ScriptArchive> {
        &self.archive
    }

    pub fn spec(&self) -> &ModuleSpec {
        self.archive.spec()
    }

    pub fn content_hash(&self) -> &ContentHash {
        self.archive.content_hash()
    }

    /// The plugin that compiled the archive, or `None` for a pass-through
    /// build.
    pub fn compiler(&self) -> Option<&PluginId> {
        self.compiler.as_ref()
    }

    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    /// Symbols the module defines (its exports).
    pub fn symbols(&self) -> &Arc<SymbolTable> {
        self.environment.own()
    }

    /// Dependencies as linked at build time.
    pub fn linked_dependencies(&self) -> &[LinkedModule] {
        self.environment.boundary().dependencies()
    }

    /// Resolve a name from inside this module.
    pub fn resolve_symbol(&self, name: &str) -> Result<Resolved, InvocationError> {
        self.environment.resolve_symbol(name)
    }

    /// Call `name` from inside this module.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, InvocationError> {
        self.environment.invoke(name, args)
    }

    /// A raw archive entry, for resources shipped alongside code.
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.archive.entry(name)
    }
}
