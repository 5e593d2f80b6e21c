//! Compiler dispatch.
//!
//! Plugins are registered explicitly by id. For each archive the first
//! declared plugin whose backend claims it does the build; if none claims
//! it the build is a pass-through with no compiled symbols. Every backend
//! invocation runs on its own thread with a private scratch directory and
//! a deadline, and its result comes back over a channel. The build thread
//! owns its scratch directory, so a timed-out build keeps it until the
//! backend returns.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use relink_core::{
    BuildFailure, CompilerPluginSpec, IsolationBoundary, ModuleId, PluginId, ScriptArchive,
    SymbolTable,
};
use tempfile::TempDir;

use crate::error::{CompilationCause, CompilationError, LoaderError, ReloadError, Result};

/// Registered compiler plugins in registration order.
#[derive(Debug, Default, Clone)]
pub struct PluginTable {
    plugins: Vec<CompilerPluginSpec>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Ids must be unique.
    pub fn register(&mut self, plugin: CompilerPluginSpec) -> Result<()> {
        if self.get(plugin.id()).is_some() {
            return Err(LoaderError::DuplicatePlugin(plugin.id().clone()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, id: &PluginId) -> Option<&CompilerPluginSpec> {
        self.plugins.iter().find(|p| p.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &PluginId> {
        self.plugins.iter().map(CompilerPluginSpec::id)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The plugin that should build `archive`, in the archive's declared
    /// priority order. `Ok(None)` means nobody claims it.
    pub fn select(
        &self,
        archive: &ScriptArchive,
    ) -> std::result::Result<Option<&CompilerPluginSpec>, ReloadError> {
        let mut chosen: Option<&CompilerPluginSpec> = None;
        for id in archive.spec().compiler_plugins() {
            let plugin = self.get(id).ok_or_else(|| ReloadError::UnknownPlugin {
                module: archive.id().clone(),
                plugin: id.clone(),
            })?;
            match chosen {
                None if plugin.backend().claims(archive) => chosen = Some(plugin),
                Some(first) if plugin.backend().claims(archive) => {
                    tracing::warn!(
                        module = %archive.id(),
                        plugin = %first.id(),
                        ignored = %plugin.id(),
                        "archive claimed by more than one declared plugin, using the first"
                    );
                }
                _ => {}
            }
        }
        Ok(chosen)
    }
}

/// Where and how long builds run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub scratch_root: Option<PathBuf>,
    pub timeout: Duration,
    pub keep_scratch: bool,
}

/// Symbols produced by one successful build.
#[derive(Debug)]
pub struct BuildOutput {
    pub symbols: SymbolTable,
    /// Plugin that compiled the archive, `None` for a pass-through.
    pub plugin: Option<PluginId>,
}

type BuildResult = thread::Result<std::result::Result<SymbolTable, BuildFailure>>;

/// A build that has been started and not yet collected.
#[derive(Debug)]
pub struct PendingBuild {
    module: ModuleId,
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Done(std::result::Result<BuildOutput, ReloadError>),
    Running {
        plugin: PluginId,
        deadline: Instant,
        timeout: Duration,
        rx: Receiver<BuildResult>,
        scratch: PathBuf,
    },
}

impl PendingBuild {
    fn done(module: ModuleId, result: std::result::Result<BuildOutput, ReloadError>) -> Self {
        Self {
            module,
            state: PendingState::Done(result),
        }
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Block until the build finishes or its deadline passes. A timed-out
    /// build thread is left to finish on its own; its result is dropped.
    pub fn wait(self) -> std::result::Result<BuildOutput, ReloadError> {
        let module = self.module;
        let (plugin, deadline, timeout, rx, scratch) = match self.state {
            PendingState::Done(result) => return result,
            PendingState::Running {
                plugin,
                deadline,
                timeout,
                rx,
                scratch,
            } => (plugin, deadline, timeout, rx, scratch),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let fail = |cause: CompilationCause| {
            ReloadError::Compilation(CompilationError {
                module: module.clone(),
                plugin: Some(plugin.clone()),
                cause,
            })
        };
        let outcome = match rx.recv_timeout(remaining) {
            Ok(Ok(Ok(symbols))) => Ok(BuildOutput {
                symbols,
                plugin: Some(plugin.clone()),
            }),
            Ok(Ok(Err(failure))) => Err(fail(CompilationCause::Backend(failure))),
            Ok(Err(payload)) => Err(fail(CompilationCause::Panicked {
                message: panic_message(payload.as_ref()),
            })),
            Err(RecvTimeoutError::Timeout) => {
                Err(fail(CompilationCause::Timeout { after: timeout }))
            }
            Err(RecvTimeoutError::Disconnected) => Err(fail(CompilationCause::Panicked {
                message: "build thread exited without a result".into(),
            })),
        };
        tracing::trace!(module = %module, scratch = %scratch.display(), "build collected");
        outcome
    }
}

/// Start building `archive` against `boundary`.
///
/// Never blocks on the backend. Selection and setup failures come back as
/// an already-finished [`PendingBuild`].
pub fn start_build(
    plugins: &PluginTable,
    settings: &DispatchSettings,
    archive: Arc<ScriptArchive>,
    boundary: Arc<IsolationBoundary>,
) -> PendingBuild {
    let module = archive.id().clone();
    let plugin = match plugins.select(&archive) {
        Ok(Some(plugin)) => plugin,
        Ok(None) => {
            tracing::debug!(module = %module, "no plugin claims archive, passing through");
            return PendingBuild::done(
                module,
                Ok(BuildOutput {
                    symbols: SymbolTable::new(),
                    plugin: None,
                }),
            );
        }
        Err(e) => return PendingBuild::done(module, Err(e)),
    };
    let plugin_id = plugin.id().clone();
    let setup_failed = |detail: String| {
        ReloadError::Compilation(CompilationError {
            module: module.clone(),
            plugin: Some(plugin_id.clone()),
            cause: CompilationCause::Setup { detail },
        })
    };

    let scratch = match scratch_dir(&module, settings) {
        Ok(dir) => dir,
        Err(e) => {
            let error = setup_failed(format!("scratch directory: {e}"));
            return PendingBuild::done(module, Err(error));
        }
    };

    let (tx, rx) = crossbeam_channel::bounded::<BuildResult>(1);
    let backend = Arc::clone(plugin.backend());
    let scratch_path = scratch.path().to_path_buf();
    let spawned = thread::Builder::new()
        .name(format!("relink-build-{module}"))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                backend.build(&archive, &boundary, scratch.path())
            }));
            // Removed before the result is sent, so a collected build has
            // already cleaned up.
            drop(scratch);
            // The receiver is gone if the build timed out.
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        let error = setup_failed(format!("build thread: {e}"));
        return PendingBuild::done(module, Err(error));
    }

    tracing::debug!(module = %module, plugin = %plugin_id, "build started");
    PendingBuild {
        module,
        state: PendingState::Running {
            plugin: plugin_id,
            deadline: Instant::now() + settings.timeout,
            timeout: settings.timeout,
            rx,
            scratch: scratch_path,
        },
    }
}

fn scratch_dir(module: &ModuleId, settings: &DispatchSettings) -> std::io::Result<TempDir> {
    let prefix = format!("relink-{}-", module.name());
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).keep(settings.keep_scratch);
    match &settings.scratch_root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
