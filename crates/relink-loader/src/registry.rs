//! Published module state.
//!
//! Readers load the current [`Snapshot`] through an `ArcSwap` and never
//! block. The loader builds a complete replacement snapshot and swaps it
//! in with one store, so a reader sees either the whole old state or the
//! whole new one.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use relink_core::ModuleId;

use crate::module::CompiledModule;

/// One immutable published state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    modules: BTreeMap<ModuleId, Arc<CompiledModule>>,
}

impl Snapshot {
    pub(crate) fn new(version: u64, modules: BTreeMap<ModuleId, Arc<CompiledModule>>) -> Self {
        Self { version, modules }
    }

    /// Commit counter; 0 for the initial empty snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &ModuleId) -> Option<&Arc<CompiledModule>> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// Modules in id order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<CompiledModule>> {
        self.modules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub(crate) fn module_map(&self) -> &BTreeMap<ModuleId, Arc<CompiledModule>> {
        &self.modules
    }
}

/// The externally queryable module registry.
#[derive(Debug)]
pub struct ModuleRegistry {
    current: ArcSwap<Snapshot>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// An empty registry at snapshot version 0.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// The currently published module for `id`.
    pub fn lookup(&self, id: &ModuleId) -> Option<Arc<CompiledModule>> {
        self.current.load().get(id).cloned()
    }

    /// Every published module, all from one snapshot.
    pub fn list_all(&self) -> Vec<Arc<CompiledModule>> {
        self.current.load().modules().cloned().collect()
    }

    /// Pin the current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn current_snapshot_version(&self) -> u64 {
        self.current.load().version()
    }

    /// Replace the published state. Only the loader's commit step calls
    /// this, under its writer lock.
    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }
}
