//! Isolation boundaries and execution environments.
//!
//! An [`IsolationBoundary`] is the complete list of symbols a module may see
//! besides its own: the core capability set, the exports of every module in
//! its flattened dependency set, the runtime resources of the compiler
//! plugins it declares, and the host namespaces that passed its import
//! allow-list. Nothing else is reachable. A boundary is built fresh for each
//! build and never mutated afterwards, so concurrent builds cannot observe
//! each other.
//!
//! An [`ExecutionEnvironment`] pairs a boundary with the module's own
//! compiled symbols. It is the handle callers and compiled code use to
//! resolve names at run time.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::InvocationError;
use crate::id::{ModuleId, PluginId};
use crate::symbol::{Symbol, SymbolTable, Value};

/// Where a resolved symbol came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Defined by the module itself.
    Own,
    /// Part of the runtime's core capability set.
    Core,
    /// Exported by a dependency, at the revision linked at build time.
    Dependency { module: ModuleId, revision: u64 },
    /// Runtime resource of a declared compiler plugin.
    Plugin(PluginId),
    /// Host namespace admitted by the import allow-list.
    Host,
}

/// A symbol together with its origin.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub symbol: Arc<Symbol>,
    pub origin: Origin,
    /// Environment the symbol executes in when it belongs to another
    /// module. `None` means the resolving environment.
    pub owner: Option<ExecutionEnvironment>,
}

impl Resolved {
    fn local(symbol: &Arc<Symbol>, origin: Origin) -> Self {
        Self {
            symbol: Arc::clone(symbol),
            origin,
            owner: None,
        }
    }
}

/// One dependency as linked into a boundary.
#[derive(Debug, Clone)]
pub struct LinkedModule {
    /// Dependency identity.
    pub id: ModuleId,
    /// Published revision the boundary was built against.
    pub revision: u64,
    /// The dependency's own environment. Its functions run here, so they
    /// keep seeing their own boundary when called from a dependent.
    pub environment: ExecutionEnvironment,
}

impl LinkedModule {
    /// The dependency's compiled symbols.
    pub fn exports(&self) -> &Arc<SymbolTable> {
        self.environment.own()
    }
}

/// The visibility scope computed for one module build.
#[derive(Debug, Clone)]
pub struct IsolationBoundary {
    module: ModuleId,
    core: Arc<SymbolTable>,
    dependencies: Vec<LinkedModule>,
    plugins: Vec<(PluginId, Arc<SymbolTable>)>,
    host: SymbolTable,
}

impl IsolationBoundary {
    /// A boundary that exposes only `core`.
    pub fn new(module: ModuleId, core: Arc<SymbolTable>) -> Self {
        Self {
            module,
            core,
            dependencies: Vec::new(),
            plugins: Vec::new(),
            host: SymbolTable::new(),
        }
    }

    /// A boundary that exposes nothing at all.
    pub fn empty(module: ModuleId) -> Self {
        Self::new(module, Arc::new(SymbolTable::new()))
    }

    /// Link a dependency's exports. Order of linking is resolution order.
    pub fn with_dependency(mut self, linked: LinkedModule) -> Self {
        self.dependencies.push(linked);
        self
    }

    /// Expose a declared plugin's runtime resources.
    pub fn with_plugin_runtime(mut self, plugin: PluginId, runtime: Arc<SymbolTable>) -> Self {
        self.plugins.push((plugin, runtime));
        self
    }

    /// Expose already-filtered host symbols.
    pub fn with_host(mut self, host: SymbolTable) -> Self {
        self.host = host;
        self
    }

    /// The module this boundary was built for.
    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Linked dependencies in resolution order.
    pub fn dependencies(&self) -> &[LinkedModule] {
        &self.dependencies
    }

    /// Plugins whose runtime resources are visible.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginId> {
        self.plugins.iter().map(|(id, _)| id)
    }

    /// Whether `module`'s exports are visible through this boundary.
    pub fn links(&self, module: &ModuleId) -> bool {
        self.dependencies.iter().any(|d| &d.id == module)
    }

    /// Resolve `name` against the boundary (core, dependencies, plugins, host).
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        if let Some(symbol) = self.core.get(name) {
            return Some(Resolved::local(symbol, Origin::Core));
        }
        for dep in &self.dependencies {
            if let Some(symbol) = dep.exports().get(name) {
                return Some(Resolved {
                    symbol: Arc::clone(symbol),
                    origin: Origin::Dependency {
                        module: dep.id.clone(),
                        revision: dep.revision,
                    },
                    owner: Some(dep.environment.clone()),
                });
            }
        }
        for (plugin, runtime) in &self.plugins {
            if let Some(symbol) = runtime.get(name) {
                return Some(Resolved::local(symbol, Origin::Plugin(plugin.clone())));
            }
        }
        self.host
            .get(name)
            .map(|symbol| Resolved::local(symbol, Origin::Host))
    }

    /// Every visible name with the origin that wins resolution for it.
    pub fn visible(&self) -> Vec<(String, Origin)> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut push = |names: &mut dyn Iterator<Item = &str>, origin: Origin| {
            for name in names {
                if seen.insert(name.to_string()) {
                    out.push((name.to_string(), origin.clone()));
                }
            }
        };
        push(&mut self.core.names(), Origin::Core);
        for dep in &self.dependencies {
            push(
                &mut dep.exports().names(),
                Origin::Dependency {
                    module: dep.id.clone(),
                    revision: dep.revision,
                },
            );
        }
        for (plugin, runtime) in &self.plugins {
            push(&mut runtime.names(), Origin::Plugin(plugin.clone()));
        }
        push(&mut self.host.names(), Origin::Host);
        out
    }
}

/// Run-time handle of a compiled module: its boundary plus its own symbols.
#[derive(Debug, Clone)]
pub struct ExecutionEnvironment {
    boundary: Arc<IsolationBoundary>,
    own: Arc<SymbolTable>,
}

impl ExecutionEnvironment {
    pub fn new(boundary: Arc<IsolationBoundary>, own: Arc<SymbolTable>) -> Self {
        Self { boundary, own }
    }

    /// An environment for an anonymous module that sees nothing.
    pub fn detached() -> Self {
        Self::new(
            Arc::new(IsolationBoundary::empty(ModuleId::anonymous())),
            Arc::new(SymbolTable::new()),
        )
    }

    /// The owning module.
    pub fn module(&self) -> &ModuleId {
        self.boundary.module()
    }

    pub fn boundary(&self) -> &Arc<IsolationBoundary> {
        &self.boundary
    }

    /// The module's own compiled symbols.
    pub fn own(&self) -> &Arc<SymbolTable> {
        &self.own
    }

    /// Resolve a name, or `None` if it is not visible.
    pub fn try_resolve(&self, name: &str) -> Option<Resolved> {
        match self.own.get(name) {
            Some(symbol) => Some(Resolved::local(symbol, Origin::Own)),
            None => self.boundary.resolve(name),
        }
    }

    /// Resolve a name. Anything outside the boundary is an isolation
    /// violation.
    pub fn resolve_symbol(&self, name: &str) -> Result<Resolved, InvocationError> {
        self.try_resolve(name)
            .ok_or_else(|| InvocationError::IsolationViolation {
                module: self.module().clone(),
                symbol: name.to_string(),
            })
    }

    /// Resolve `name` and call it with `args`. Symbols exported by a
    /// dependency run in that dependency's environment.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let resolved = self.resolve_symbol(name)?;
        let env = resolved.owner.as_ref().unwrap_or(self);
        resolved.symbol.invoke(env, args)
    }
}
