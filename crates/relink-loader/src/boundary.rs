//! Isolation boundary construction.
//!
//! For each build the builder composes a fresh [`IsolationBoundary`] from
//! four sources and nothing else:
//!
//! 1. the core capability set,
//! 2. the exports of the module's dependencies, flattened transitively
//!    along declared edges,
//! 3. the runtime tables of the compiler plugins the module declares,
//! 4. host symbols admitted by both the process-wide exposed packages and
//!    the module's allowed imports.
//!
//! Dependencies are taken from the candidate state of the running cycle,
//! so a dependent always links against the revision built (or retained)
//! earlier in the same cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use relink_core::{
    within_namespace, IsolationBoundary, LinkedModule, ModuleId, ModuleSpec, SymbolTable,
};

use crate::dispatch::PluginTable;
use crate::error::ReloadError;
use crate::module::CompiledModule;

/// Composes boundaries from the loader's fixed inputs.
#[derive(Debug, Clone)]
pub struct BoundaryBuilder {
    core: Arc<SymbolTable>,
    host: Arc<SymbolTable>,
    exposed_packages: Vec<String>,
}

impl BoundaryBuilder {
    pub fn new(
        core: Arc<SymbolTable>,
        host: Arc<SymbolTable>,
        exposed_packages: Vec<String>,
    ) -> Self {
        Self {
            core,
            host,
            exposed_packages,
        }
    }

    /// Whether a host symbol name passes both allow-lists. Empty lists admit
    /// nothing.
    pub fn admits(&self, spec: &ModuleSpec, name: &str) -> bool {
        self.exposed_packages
            .iter()
            .any(|p| within_namespace(name, p))
            && spec
                .allowed_imports()
                .iter()
                .any(|p| within_namespace(name, p))
    }

    /// Build the boundary for `spec` against `candidate`.
    pub fn build(
        &self,
        spec: &ModuleSpec,
        candidate: &BTreeMap<ModuleId, Arc<CompiledModule>>,
        plugins: &PluginTable,
    ) -> Result<IsolationBoundary, ReloadError> {
        let module = spec.id();
        let mut boundary = IsolationBoundary::new(module.clone(), Arc::clone(&self.core));

        for linked in flatten_dependencies(spec, candidate)? {
            tracing::trace!(
                module = %module,
                dependency = %linked.id(),
                revision = linked.revision(),
                "linking dependency"
            );
            boundary = boundary.with_dependency(LinkedModule {
                id: linked.id().clone(),
                revision: linked.revision(),
                environment: linked.environment().clone(),
            });
        }

        for plugin in spec.compiler_plugins() {
            let registered = plugins.get(plugin).ok_or_else(|| ReloadError::UnknownPlugin {
                module: module.clone(),
                plugin: plugin.clone(),
            })?;
            tracing::trace!(module = %module, plugin = %plugin, "exposing plugin runtime");
            boundary =
                boundary.with_plugin_runtime(plugin.clone(), Arc::clone(registered.runtime()));
        }

        let host = self.host.filtered(|symbol| self.admits(spec, symbol.name()));
        tracing::trace!(module = %module, admitted = host.len(), "filtered host symbols");
        Ok(boundary.with_host(host))
    }
}

/// Every module reachable from `spec` along declared dependency edges, in
/// depth-first pre-order of declaration. Each appears once.
fn flatten_dependencies(
    spec: &ModuleSpec,
    candidate: &BTreeMap<ModuleId, Arc<CompiledModule>>,
) -> Result<Vec<Arc<CompiledModule>>, ReloadError> {
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<(ModuleId, ModuleId)> = spec
        .dependencies()
        .iter()
        .rev()
        .map(|dep| (spec.id().clone(), dep.clone()))
        .collect();

    while let Some((dependent, dep)) = stack.pop() {
        if !seen.insert(dep.clone()) {
            continue;
        }
        let Some(linked) = candidate.get(&dep) else {
            return Err(ReloadError::UnresolvedDependency {
                module: dependent,
                missing: dep,
            });
        };
        for next in linked.spec().dependencies().iter().rev() {
            if !seen.contains(next) {
                stack.push((dep.clone(), next.clone()));
            }
        }
        order.push(Arc::clone(linked));
    }
    Ok(order)
}
