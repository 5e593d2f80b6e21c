//! The module loader: reload cycles from change-set to commit.
//!
//! A cycle runs entirely under the loader's writer lock:
//!
//! 1. normalize the change-set against the current snapshot,
//! 2. compute the affected closure (submitted modules plus every transitive
//!    dependent of a submitted or removed module),
//! 3. resolve the full spec set,
//! 4. build affected modules tier by tier against a candidate state that
//!    starts as the current snapshot and absorbs each successful build,
//! 5. publish the candidate as the next snapshot in one swap,
//! 6. notify listeners.
//!
//! Failed modules are never written to the candidate, so they keep
//! whatever revision was published before. Readers keep using the
//! registry throughout.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use relink_core::{
    CompilerPluginSpec, ExecutionEnvironment, ModuleId, PluginId, ScriptArchive, Symbol,
    SymbolTable,
};
use uuid::Uuid;

use crate::boundary::BoundaryBuilder;
use crate::cancel::CancelToken;
use crate::config::LoaderConfig;
use crate::core_api::core_symbols;
use crate::dispatch::{self, DispatchSettings, PluginTable};
use crate::error::{LoaderError, ReloadError, Result};
use crate::listener::{ListenerSet, ModuleListener};
use crate::module::CompiledModule;
use crate::registry::{ModuleRegistry, Snapshot};
use crate::report::{ModuleOutcome, ReloadReport};
use crate::resolver::{resolve, DependencyGraph, Resolution};

/// Archives to add or update and modules to remove, applied as one cycle.
///
/// Adding a module that is already published updates it, and updating one
/// that is not published adds it. When the same id is submitted twice the
/// last archive wins. Removing an id also discards any archive submitted
/// for it in the same change-set.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    adds: Vec<ScriptArchive>,
    updates: Vec<ScriptArchive>,
    removes: Vec<ModuleId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, archive: ScriptArchive) -> Self {
        self.adds.push(archive);
        self
    }

    pub fn update(mut self, archive: ScriptArchive) -> Self {
        self.updates.push(archive);
        self
    }

    pub fn remove(mut self, id: ModuleId) -> Self {
        self.removes.push(id);
        self
    }

    pub fn adds(&self) -> &[ScriptArchive] {
        &self.adds
    }

    pub fn updates(&self) -> &[ScriptArchive] {
        &self.updates
    }

    pub fn removes(&self) -> &[ModuleId] {
        &self.removes
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.removes.is_empty()
    }
}

/// Builder for [`ModuleLoader`].
#[derive(Default)]
pub struct ModuleLoaderBuilder {
    config: LoaderConfig,
    plugins: Vec<CompilerPluginSpec>,
    core: Vec<Symbol>,
    host: Vec<Symbol>,
    listeners: Vec<Arc<dyn ModuleListener>>,
}

impl ModuleLoaderBuilder {
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a compiler plugin.
    pub fn plugin(mut self, plugin: CompilerPluginSpec) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Add a symbol to the core set every module sees.
    pub fn core_symbol(mut self, symbol: Symbol) -> Self {
        self.core.push(symbol);
        self
    }

    /// Add host symbols. Modules see them only through their allowed
    /// imports and the configured exposed packages.
    pub fn host_symbols(mut self, table: &SymbolTable) -> Self {
        self.host.extend(table.iter().map(|symbol| (**symbol).clone()));
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ModuleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<ModuleLoader> {
        self.config.validate()?;
        if let Some(root) = &self.config.scratch_root {
            std::fs::create_dir_all(root).map_err(|source| LoaderError::ScratchRoot {
                path: root.clone(),
                source,
            })?;
        }

        let mut core = core_symbols()?;
        for symbol in self.core {
            core.insert(symbol)?;
        }
        let mut host = SymbolTable::new();
        for symbol in self.host {
            host.insert(symbol)?;
        }
        let mut plugins = PluginTable::new();
        for plugin in self.plugins {
            plugins.register(plugin)?;
        }
        let listeners = ListenerSet::default();
        for listener in self.listeners {
            listeners.add(listener);
        }

        tracing::debug!(
            plugins = plugins.len(),
            core = core.len(),
            host = host.len(),
            "module loader ready"
        );
        Ok(ModuleLoader {
            registry: Arc::new(ModuleRegistry::new()),
            boundaries: BoundaryBuilder::new(
                Arc::new(core),
                Arc::new(host),
                self.config.exposed_packages.clone(),
            ),
            plugins,
            settings: DispatchSettings {
                scratch_root: self.config.scratch_root.clone(),
                timeout: self.config.build_timeout(),
                keep_scratch: self.config.keep_scratch,
            },
            parallelism: self.config.parallelism(),
            listeners,
            writer: Mutex::new(WriterState::default()),
        })
    }
}

/// State owned by whoever holds the writer lock.
#[derive(Debug, Default)]
struct WriterState {
    /// Highest revision ever assigned per module, kept across removals.
    revisions: BTreeMap<ModuleId, u64>,
}

/// Orchestrates reload cycles and owns the registry they publish to.
#[derive(Debug)]
pub struct ModuleLoader {
    registry: Arc<ModuleRegistry>,
    boundaries: BoundaryBuilder,
    plugins: PluginTable,
    settings: DispatchSettings,
    parallelism: usize,
    listeners: ListenerSet,
    writer: Mutex<WriterState>,
}

impl ModuleLoader {
    pub fn builder() -> ModuleLoaderBuilder {
        ModuleLoaderBuilder::default()
    }

    /// The published registry. Cloning the `Arc` lets readers outlive the
    /// loader handle.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn lookup(&self, id: &ModuleId) -> Option<Arc<CompiledModule>> {
        self.registry.lookup(id)
    }

    pub fn list_all(&self) -> Vec<Arc<CompiledModule>> {
        self.registry.list_all()
    }

    pub fn plugins(&self) -> &PluginTable {
        &self.plugins
    }

    pub fn add_listener(&self, listener: Arc<dyn ModuleListener>) {
        self.listeners.add(listener);
    }

    /// Apply a change-set as one reload cycle.
    pub fn apply_change_set(&self, changes: ChangeSet) -> ReloadReport {
        self.apply_change_set_with(changes, &CancelToken::new())
    }

    /// Apply a change-set, stopping before commit if `cancel` is set.
    ///
    /// Listeners are notified before this returns, under the same writer
    /// lock; see [`ModuleListener`].
    pub fn apply_change_set_with(
        &self,
        changes: ChangeSet,
        cancel: &CancelToken,
    ) -> ReloadReport {
        let mut state = self.writer.lock();
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("reload", cycle = %cycle_id);
        let _enter = span.enter();
        self.run_cycle(&mut state, cycle_id, &changes, cancel)
    }

    /// Add or update archives.
    pub fn update_archives(
        &self,
        archives: impl IntoIterator<Item = ScriptArchive>,
    ) -> ReloadReport {
        let changes = archives
            .into_iter()
            .fold(ChangeSet::new(), |changes, archive| changes.update(archive));
        self.apply_change_set(changes)
    }

    /// Remove one module.
    pub fn remove_module(&self, id: &ModuleId) -> ReloadReport {
        self.apply_change_set(ChangeSet::new().remove(id.clone()))
    }

    /// Resolve what a change-set would build, without building anything.
    pub fn resolve_change_set(&self, changes: &ChangeSet) -> Resolution {
        let current = self.registry.snapshot();
        CyclePlan::new(&current, changes).resolution
    }

    fn run_cycle(
        &self,
        state: &mut WriterState,
        cycle_id: Uuid,
        changes: &ChangeSet,
        cancel: &CancelToken,
    ) -> ReloadReport {
        let current = self.registry.snapshot();
        let plan = CyclePlan::new(&current, changes);
        tracing::debug!(
            submitted = plan.incoming.len(),
            removed = plan.removed.len(),
            affected = plan.affected.len(),
            "reload planned"
        );

        let mut cycle = CycleState::new(&current, &plan.removed, &state.revisions);
        for id in &plan.affected {
            if let Some(error) = plan.resolution.rejected.get(id) {
                cycle.fail(id, error.clone());
            }
        }

        for tier in &plan.resolution.tiers {
            if cancel.is_cancelled() {
                return cycle.cancelled(cycle_id, plan.order, current.version());
            }
            let work: Vec<&ModuleId> = tier
                .iter()
                .filter(|id| plan.affected.contains(*id))
                .collect();
            for chunk in work.chunks(self.parallelism) {
                self.build_chunk(chunk, &plan, &mut cycle);
            }
        }

        if cancel.is_cancelled() {
            return cycle.cancelled(cycle_id, plan.order, current.version());
        }

        for id in &plan.removed {
            if let Some(old) = current.get(id) {
                cycle.outcomes.insert(
                    id.clone(),
                    ModuleOutcome::Removed {
                        last_revision: old.revision(),
                    },
                );
            }
        }

        let committed = cycle.outcomes.values().any(|o| {
            matches!(
                o,
                ModuleOutcome::Published { .. } | ModuleOutcome::Removed { .. }
            )
        });
        let mut notifications = Vec::new();
        let snapshot_version = if committed {
            for (id, outcome) in &cycle.outcomes {
                match outcome {
                    ModuleOutcome::Failed { .. } => {}
                    _ => notifications
                        .push((cycle.candidate.get(id).cloned(), current.get(id).cloned())),
                }
            }
            let version = current.version() + 1;
            self.registry
                .publish(Snapshot::new(version, std::mem::take(&mut cycle.candidate)));
            state.revisions = std::mem::take(&mut cycle.revisions);
            version
        } else {
            current.version()
        };

        let failed = cycle.outcomes.values().filter(|o| o.is_failure()).count();
        if committed {
            tracing::info!(
                snapshot = snapshot_version,
                changed = notifications.len(),
                failed,
                "reload committed"
            );
        } else {
            tracing::info!(failed, "reload made no changes");
        }

        let listeners = self.listeners.current();
        for (new, old) in &notifications {
            ListenerSet::updated(&listeners, new.as_ref(), old.as_ref());
        }
        for (id, outcome) in &cycle.outcomes {
            if let ModuleOutcome::Failed { error, .. } = outcome {
                ListenerSet::rejected(&listeners, id, error);
            }
        }

        ReloadReport {
            cycle_id,
            order: plan.order,
            committed,
            cancelled: false,
            snapshot_version,
            outcomes: cycle.outcomes,
        }
    }

    /// Build one group of independent modules in parallel.
    fn build_chunk(&self, chunk: &[&ModuleId], plan: &CyclePlan, cycle: &mut CycleState) {
        let mut pending = Vec::new();
        for &id in chunk {
            let Some(archive) = plan.archives.get(id) else {
                continue;
            };
            let spec = archive.spec();
            let failed_dependency = spec
                .dependencies()
                .iter()
                .find(|d| cycle.failed.contains(*d));
            if let Some(dependency) = failed_dependency {
                let error = ReloadError::DependencyFailed {
                    module: id.clone(),
                    dependency: dependency.clone(),
                };
                cycle.fail(id, error);
                continue;
            }
            match self.boundaries.build(spec, &cycle.candidate, &self.plugins) {
                Ok(boundary) => {
                    let boundary = Arc::new(boundary);
                    let build = dispatch::start_build(
                        &self.plugins,
                        &self.settings,
                        Arc::clone(archive),
                        Arc::clone(&boundary),
                    );
                    pending.push((Arc::clone(archive), boundary, build));
                }
                Err(error) => cycle.fail(id, error),
            }
        }

        for (archive, boundary, build) in pending {
            let id = archive.id().clone();
            match build.wait() {
                Ok(output) => {
                    let environment =
                        ExecutionEnvironment::new(boundary, Arc::new(output.symbols));
                    cycle.publish(archive, environment, output.plugin);
                }
                Err(error) => cycle.fail(&id, error),
            }
        }
    }
}

/// Normalized inputs of one cycle.
struct CyclePlan {
    incoming: BTreeMap<ModuleId, Arc<ScriptArchive>>,
    /// Published modules being removed.
    removed: BTreeSet<ModuleId>,
    /// Full spec set after the change-set is applied.
    archives: BTreeMap<ModuleId, Arc<ScriptArchive>>,
    /// Modules to (re)build this cycle.
    affected: BTreeSet<ModuleId>,
    resolution: Resolution,
    /// Affected modules in build order.
    order: Vec<ModuleId>,
}

impl CyclePlan {
    fn new(current: &Snapshot, changes: &ChangeSet) -> Self {
        let mut incoming: BTreeMap<ModuleId, Arc<ScriptArchive>> = BTreeMap::new();
        for archive in changes.adds.iter().chain(&changes.updates) {
            let id = archive.id().clone();
            if incoming.insert(id.clone(), Arc::new(archive.clone())).is_some() {
                tracing::warn!(
                    module = %id,
                    "module submitted twice in one change-set, keeping the last archive"
                );
            }
        }

        let mut removed = BTreeSet::new();
        for id in &changes.removes {
            if incoming.remove(id).is_some() {
                tracing::debug!(
                    module = %id,
                    "removal overrides archive submitted in the same change-set"
                );
            }
            if current.contains(id) {
                removed.insert(id.clone());
            } else {
                tracing::debug!(module = %id, "ignoring removal of unpublished module");
            }
        }

        let mut archives: BTreeMap<ModuleId, Arc<ScriptArchive>> = current
            .modules()
            .filter(|m| !removed.contains(m.id()))
            .map(|m| (m.id().clone(), Arc::clone(m.archive())))
            .collect();
        for (id, archive) in &incoming {
            archives.insert(id.clone(), Arc::clone(archive));
        }

        let graph = DependencyGraph::from_specs(archives.values().map(|a| a.spec()));
        let changed: Vec<&ModuleId> = incoming.keys().chain(&removed).collect();
        let mut affected = graph.transitive_dependents(changed);
        affected.extend(incoming.keys().cloned());

        let resolution = resolve(&graph);
        let order = resolution
            .order
            .iter()
            .filter(|id| affected.contains(*id))
            .cloned()
            .collect();

        Self {
            incoming,
            removed,
            archives,
            affected,
            resolution,
            order,
        }
    }
}

/// Working state of one cycle.
struct CycleState<'a> {
    current: &'a Snapshot,
    candidate: BTreeMap<ModuleId, Arc<CompiledModule>>,
    revisions: BTreeMap<ModuleId, u64>,
    failed: BTreeSet<ModuleId>,
    outcomes: BTreeMap<ModuleId, ModuleOutcome>,
}

impl<'a> CycleState<'a> {
    fn new(
        current: &'a Snapshot,
        removed: &BTreeSet<ModuleId>,
        revisions: &BTreeMap<ModuleId, u64>,
    ) -> Self {
        let mut candidate = current.module_map().clone();
        candidate.retain(|id, _| !removed.contains(id));
        Self {
            current,
            candidate,
            revisions: revisions.clone(),
            failed: BTreeSet::new(),
            outcomes: BTreeMap::new(),
        }
    }

    fn retained(&self, id: &ModuleId) -> Option<u64> {
        self.current.get(id).map(|m| m.revision())
    }

    fn fail(&mut self, id: &ModuleId, error: ReloadError) {
        let retained = self.retained(id);
        tracing::warn!(module = %id, retained = ?retained, error = %error, "module quarantined");
        self.failed.insert(id.clone());
        self.outcomes
            .insert(id.clone(), ModuleOutcome::Failed { error, retained });
    }

    fn publish(
        &mut self,
        archive: Arc<ScriptArchive>,
        environment: ExecutionEnvironment,
        compiler: Option<PluginId>,
    ) {
        let id = archive.id().clone();
        let revision = self.revisions.get(&id).copied().unwrap_or(0) + 1;
        self.revisions.insert(id.clone(), revision);
        let previous = self.retained(&id);
        tracing::debug!(
            module = %id,
            revision,
            plugin = compiler.as_ref().map(|p| p.as_str()).unwrap_or("none"),
            hash = archive.content_hash().short(),
            "module built"
        );
        self.candidate.insert(
            id.clone(),
            Arc::new(CompiledModule::new(revision, archive, environment, compiler)),
        );
        self.outcomes
            .insert(id, ModuleOutcome::Published { revision, previous });
    }

    /// Report for a cycle stopped before commit. Only failures are kept;
    /// nothing else happened.
    fn cancelled(self, cycle_id: Uuid, order: Vec<ModuleId>, version: u64) -> ReloadReport {
        tracing::info!("reload cancelled before commit");
        let outcomes = self
            .outcomes
            .into_iter()
            .filter(|(_, o)| o.is_failure())
            .collect();
        ReloadReport {
            cycle_id,
            order,
            committed: false,
            cancelled: true,
            snapshot_version: version,
            outcomes,
        }
    }
}
