//! Callbacks fired after each commit.

use std::sync::Arc;

use parking_lot::RwLock;
use relink_core::ModuleId;

use crate::error::ReloadError;
use crate::module::CompiledModule;

/// Observer of registry changes.
///
/// Called on the reloading thread after the new snapshot is visible and
/// before the next cycle may start, so every listener sees cycles in commit
/// order. The loader's writer lock is still held during the call: a
/// listener must not apply a change-set from inside a callback, or the
/// reload deadlocks. Hand follow-up reloads to another thread instead.
/// Reading the registry and registering more listeners are fine.
pub trait ModuleListener: Send + Sync {
    /// A module was published (`new` set, `old` set on replacement) or
    /// removed (`new` empty).
    fn module_updated(
        &self,
        new: Option<&Arc<CompiledModule>>,
        old: Option<&Arc<CompiledModule>>,
    );

    /// A module could not be committed this cycle.
    fn archive_rejected(&self, _module: &ModuleId, _error: &ReloadError) {}
}

/// Listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn ModuleListener>>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn ModuleListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// The listeners registered right now. Callbacks run on this copy, so a
    /// listener may register another without deadlocking.
    pub(crate) fn current(&self) -> Vec<Arc<dyn ModuleListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn updated(
        listeners: &[Arc<dyn ModuleListener>],
        new: Option<&Arc<CompiledModule>>,
        old: Option<&Arc<CompiledModule>>,
    ) {
        for listener in listeners {
            listener.module_updated(new, old);
        }
    }

    pub(crate) fn rejected(
        listeners: &[Arc<dyn ModuleListener>],
        module: &ModuleId,
        error: &ReloadError,
    ) {
        for listener in listeners {
            listener.archive_rejected(module, error);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet").field("len", &self.len()).finish()
    }
}
