//! Running caller code against published modules.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use relink_core::ModuleId;

use crate::module::CompiledModule;
use crate::registry::ModuleRegistry;

/// Per-module execution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub executions: u64,
    pub failures: u64,
    /// Revision seen by the most recent execution.
    pub last_revision: u64,
}

/// Executes a closure against a set of modules and keeps statistics.
#[derive(Debug, Default)]
pub struct ModuleExecutor {
    stats: Mutex<BTreeMap<ModuleId, ExecutionStats>>,
}

impl ModuleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once per module in `ids`, all against one registry snapshot.
    ///
    /// Ids that are not published are skipped. Results are keyed by module.
    pub fn execute_modules<T, E, F>(
        &self,
        ids: &[ModuleId],
        registry: &ModuleRegistry,
        mut f: F,
    ) -> BTreeMap<ModuleId, Result<T, E>>
    where
        F: FnMut(&CompiledModule) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let snapshot = registry.snapshot();
        let mut results = BTreeMap::new();
        for id in ids {
            let Some(module) = snapshot.get(id) else {
                tracing::debug!(module = %id, "skipping execution of unpublished module");
                continue;
            };
            let result = f(module);
            {
                let mut stats = self.stats.lock();
                let entry = stats.entry(id.clone()).or_default();
                entry.executions += 1;
                entry.last_revision = module.revision();
                if let Err(e) = &result {
                    entry.failures += 1;
                    tracing::warn!(
                        module = %id,
                        revision = module.revision(),
                        error = %e,
                        "module execution failed"
                    );
                }
            }
            results.insert(id.clone(), result);
        }
        results
    }

    pub fn stats(&self, id: &ModuleId) -> Option<ExecutionStats> {
        self.stats.lock().get(id).copied()
    }

    /// Statistics for every module executed so far.
    pub fn all_stats(&self) -> BTreeMap<ModuleId, ExecutionStats> {
        self.stats.lock().clone()
    }
}
