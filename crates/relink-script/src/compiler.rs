//! The `.rls` script backend.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use relink_core::{
    display_value, BuildFailure, CompilerBackend, CompilerPluginSpec, InvocationError,
    IsolationBoundary, PluginId, ScriptArchive, Symbol, SymbolTable, Value,
};

use crate::eval::evaluate;
use crate::parse::{parse_source, Definition};

/// Plugin id the script backend registers under.
pub const PLUGIN_ID: &str = "script";

/// Entries compiled by the script backend.
pub const SOURCE_SUFFIX: &str = ".rls";

/// Compiles `.rls` sources into function symbols.
#[derive(Debug, Clone)]
pub struct ScriptCompiler {
    link_check: bool,
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self { link_check: true }
    }
}

impl ScriptCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether references must resolve at build time. When off, unresolved
    /// names surface as isolation violations on invocation instead.
    pub fn with_link_check(mut self, enabled: bool) -> Self {
        self.link_check = enabled;
        self
    }

    pub fn link_check(&self) -> bool {
        self.link_check
    }

    /// Plugin registration for this backend, including its runtime library.
    pub fn plugin_spec(self) -> relink_core::Result<CompilerPluginSpec> {
        self.plugin_spec_with_id(PluginId::new(PLUGIN_ID)?)
    }

    /// Same as [`plugin_spec`](Self::plugin_spec) under another plugin id.
    pub fn plugin_spec_with_id(self, id: PluginId) -> relink_core::Result<CompilerPluginSpec> {
        let link_check = self.link_check;
        Ok(CompilerPluginSpec::new(id, Arc::new(self))
            .with_runtime(runtime_symbols()?)
            .with_metadata("language", "relink-script")
            .with_metadata("suffix", SOURCE_SUFFIX)
            .with_metadata("link-check", link_check.to_string()))
    }

    /// Compile every `.rls` entry of `archive` against `boundary`.
    pub fn compile(
        &self,
        archive: &ScriptArchive,
        boundary: &IsolationBoundary,
    ) -> Result<SymbolTable, BuildFailure> {
        self.compile_with(archive, boundary, SymbolTable::new())
    }

    /// Compile on top of symbols the module already has, such as constants
    /// loaded from precompiled tables. Scripts may reference them, and the
    /// result holds both.
    pub fn compile_with(
        &self,
        archive: &ScriptArchive,
        boundary: &IsolationBoundary,
        preloaded: SymbolTable,
    ) -> Result<SymbolTable, BuildFailure> {
        let default_namespace = archive.id().name();
        let mut definitions: BTreeMap<String, (String, Definition)> = BTreeMap::new();

        for (entry, bytes) in archive.entries_with_suffix(SOURCE_SUFFIX) {
            let source = std::str::from_utf8(bytes)
                .map_err(|e| BuildFailure::new(format!("not valid UTF-8: {e}")).in_entry(entry))?;
            let parsed = parse_source(source, default_namespace).map_err(|e| {
                BuildFailure::new(e.message).in_entry(entry).at_line(e.line)
            })?;
            for def in parsed {
                if preloaded.contains(&def.name) {
                    return Err(BuildFailure::new(format!(
                        "'{}' is already defined by a precompiled table",
                        def.name
                    ))
                    .in_entry(entry)
                    .at_line(def.line));
                }
                if let Some((first_entry, first)) = definitions.get(&def.name) {
                    return Err(BuildFailure::new(format!(
                        "duplicate definition of '{}' (first defined at {first_entry}:{})",
                        def.name, first.line
                    ))
                    .in_entry(entry)
                    .at_line(def.line));
                }
                definitions.insert(def.name.clone(), (entry.to_string(), def));
            }
        }

        if self.link_check {
            for (entry, def) in definitions.values() {
                for (name, argc) in def.body.references() {
                    let fail =
                        |msg: String| BuildFailure::new(msg).in_entry(entry).at_line(def.line);
                    match definitions.get(name) {
                        Some((_, target)) if target.body.arity() != argc => {
                            return Err(fail(format!(
                                "'{name}' expects {} argument(s), got {argc}",
                                target.body.arity()
                            )));
                        }
                        Some(_) => {}
                        None if preloaded.contains(name) && argc > 0 => {
                            return Err(fail(format!(
                                "'{name}' is a constant and takes no arguments"
                            )));
                        }
                        None if preloaded.contains(name) => {}
                        None if boundary.resolve(name).is_some() => {}
                        None => return Err(fail(format!("unresolved symbol '{name}'"))),
                    }
                }
            }
        }

        let mut table = preloaded;
        for (entry, def) in definitions.into_values() {
            let Definition { name, body, line } = def;
            let arity = body.arity();
            let symbol_name = name.clone();
            Symbol::function(name, move |env, args: &[Value]| {
                if args.len() != arity {
                    return Err(InvocationError::Arity {
                        symbol: symbol_name.clone(),
                        expected: arity,
                        actual: args.len(),
                    });
                }
                evaluate(&body, env, args, &symbol_name)
            })
            .and_then(|symbol| table.insert(symbol))
            .map_err(|e| BuildFailure::new(e.to_string()).in_entry(&entry).at_line(line))?;
        }

        tracing::debug!(module = %archive.id(), symbols = table.len(), "compiled script archive");
        Ok(table)
    }
}

impl CompilerBackend for ScriptCompiler {
    fn claims(&self, archive: &ScriptArchive) -> bool {
        archive.entries_with_suffix(SOURCE_SUFFIX).next().is_some()
    }

    fn build(
        &self,
        archive: &ScriptArchive,
        boundary: &IsolationBoundary,
        _scratch: &Path,
    ) -> Result<SymbolTable, BuildFailure> {
        self.compile(archive, boundary)
    }
}

/// Library visible to modules that declare the script plugin.
pub(crate) fn runtime_symbols() -> relink_core::Result<SymbolTable> {
    let mut table = SymbolTable::new();

    table.define_function("script.runtime.join", |_, args: &[Value]| {
        let Some((sep, items)) = args.split_first() else {
            return Err(InvocationError::Arity {
                symbol: "script.runtime.join".into(),
                expected: 1,
                actual: 0,
            });
        };
        let sep = display_value(sep);
        let joined = items.iter().map(display_value).collect::<Vec<_>>().join(&sep);
        Ok(Value::String(joined))
    })?;

    table.define_function("script.runtime.repeat", |_, args: &[Value]| {
        let [value, count] = args else {
            return Err(InvocationError::Arity {
                symbol: "script.runtime.repeat".into(),
                expected: 2,
                actual: args.len(),
            });
        };
        let count = count
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| InvocationError::Failed {
                symbol: "script.runtime.repeat".into(),
                message: format!("count must be a non-negative integer, got {count}"),
            })?;
        Ok(Value::String(display_value(value).repeat(count)))
    })?;

    Ok(table)
}
