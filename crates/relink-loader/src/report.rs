//! Per-cycle reload reports.

use std::collections::BTreeMap;
use std::fmt;

use relink_core::ModuleId;
use uuid::Uuid;

use crate::error::ReloadError;

/// What happened to one module in a reload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// A new revision was committed.
    Published {
        revision: u64,
        /// Revision it replaced, if the module was already published.
        previous: Option<u64>,
    },
    /// The module was dropped from the registry.
    Removed { last_revision: u64 },
    /// Nothing was committed for the module.
    Failed {
        error: ReloadError,
        /// Revision still published, if any.
        retained: Option<u64>,
    },
}

impl ModuleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ModuleOutcome::Failed { .. })
    }
}

impl fmt::Display for ModuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleOutcome::Published {
                revision,
                previous: Some(previous),
            } => write!(f, "published r{revision} (was r{previous})"),
            ModuleOutcome::Published { revision, .. } => write!(f, "published r{revision}"),
            ModuleOutcome::Removed { last_revision } => write!(f, "removed (was r{last_revision})"),
            ModuleOutcome::Failed {
                error,
                retained: Some(retained),
            } => write!(f, "failed, keeping r{retained}: {error}"),
            ModuleOutcome::Failed { error, .. } => write!(f, "failed: {error}"),
        }
    }
}

/// Structured result of one reload cycle.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    /// Identifies the cycle in logs.
    pub cycle_id: Uuid,
    /// Modules attempted, in build order.
    pub order: Vec<ModuleId>,
    /// Whether a new snapshot was published.
    pub committed: bool,
    /// Whether the cycle was cancelled before commit.
    pub cancelled: bool,
    /// Registry snapshot version after the cycle.
    pub snapshot_version: u64,
    /// Outcome per affected module.
    pub outcomes: BTreeMap<ModuleId, ModuleOutcome>,
}

impl ReloadReport {
    pub fn outcome(&self, id: &ModuleId) -> Option<&ModuleOutcome> {
        self.outcomes.get(id)
    }

    /// Failed modules with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&ModuleId, &ReloadError)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            ModuleOutcome::Failed { error, .. } => Some((id, error)),
            _ => None,
        })
    }

    /// True when nothing failed and the cycle was not cancelled.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }

    /// Revision published for `id` by this cycle, if any.
    pub fn published_revision(&self, id: &ModuleId) -> Option<u64> {
        match self.outcomes.get(id) {
            Some(ModuleOutcome::Published { revision, .. }) => Some(*revision),
            _ => None,
        }
    }
}
