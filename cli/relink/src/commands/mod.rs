//! CLI command implementations.

pub mod inspect;
pub mod load;
pub mod order;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use relink_core::{InvocationError, Origin, ScriptArchive, SymbolTable, Value};
use relink_loader::{ChangeSet, ModuleLoader, ReloadReport};

/// Host namespaces the CLI offers to modules. Modules still need them in
/// both `exposed-packages` and their own `allowed-imports`.
pub fn host_symbols() -> Result<SymbolTable> {
    let mut host = SymbolTable::new();
    host.define_constant("host.process.id", Value::from(std::process::id()))?;
    host.define_function("host.clock.unix-ms", |_, args: &[Value]| {
        if !args.is_empty() {
            return Err(InvocationError::Arity {
                symbol: "host.clock.unix-ms".into(),
                expected: 0,
                actual: args.len(),
            });
        }
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Value::from(ms))
    })?;
    Ok(host)
}

/// Read each directory as an archive.
pub fn read_archives(dirs: &[PathBuf]) -> Result<Vec<ScriptArchive>> {
    dirs.iter()
        .map(|dir| {
            ScriptArchive::from_dir(dir)
                .with_context(|| format!("reading archive {}", dir.display()))
        })
        .collect()
}

/// Submit every archive as one change-set.
pub fn load_all(loader: &ModuleLoader, archives: Vec<ScriptArchive>) -> ReloadReport {
    let changes = archives
        .into_iter()
        .fold(ChangeSet::new(), |changes, archive| changes.add(archive));
    loader.apply_change_set(changes)
}

pub fn describe_origin(origin: &Origin) -> String {
    match origin {
        Origin::Own => "own".to_string(),
        Origin::Core => "core".to_string(),
        Origin::Dependency { module, revision } => format!("dependency {module} r{revision}"),
        Origin::Plugin(plugin) => format!("plugin {plugin}"),
        Origin::Host => "host".to_string(),
    }
}
