//! The precompiled symbol-table backend.
//!
//! Archives carry `*.symbols.toml` entries with a `[symbols]` table. Nested
//! tables become namespaces, everything else becomes a constant:
//!
//! ```toml
//! [symbols.lib.b]
//! greeting = "Hello B v1"
//! answer = 42
//! ```
//!
//! defines `lib.b.greeting` and `lib.b.answer`.

use std::path::Path;
use std::sync::Arc;

use relink_core::{
    BuildFailure, CompilerBackend, CompilerPluginSpec, IsolationBoundary, PluginId,
    ScriptArchive, SymbolTable,
};
use serde::Deserialize;

/// Plugin id the symbols backend registers under.
pub const PLUGIN_ID: &str = "symbols";

/// Entries loaded by the symbols backend.
pub const SYMBOLS_SUFFIX: &str = ".symbols.toml";

#[derive(Debug, Deserialize)]
struct SymbolsFile {
    #[serde(default)]
    symbols: toml::Table,
}

/// Loads precompiled constant tables. No code runs at build time.
#[derive(Debug, Clone, Default)]
pub struct SymbolsLoader;

impl SymbolsLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn plugin_spec(self) -> relink_core::Result<CompilerPluginSpec> {
        self.plugin_spec_with_id(PluginId::new(PLUGIN_ID)?)
    }

    pub fn plugin_spec_with_id(self, id: PluginId) -> relink_core::Result<CompilerPluginSpec> {
        Ok(CompilerPluginSpec::new(id, Arc::new(self)).with_metadata("suffix", SYMBOLS_SUFFIX))
    }

    /// Load every `*.symbols.toml` entry of `archive` into one table.
    pub fn load(&self, archive: &ScriptArchive) -> Result<SymbolTable, BuildFailure> {
        let mut table = SymbolTable::new();
        for (entry, bytes) in archive.entries_with_suffix(SYMBOLS_SUFFIX) {
            let source = std::str::from_utf8(bytes)
                .map_err(|e| BuildFailure::new(format!("not valid UTF-8: {e}")).in_entry(entry))?;
            let file: SymbolsFile = toml::from_str(source).map_err(|e| {
                let failure = BuildFailure::new(e.message().to_string()).in_entry(entry);
                match e.span() {
                    Some(span) => failure.at_line(line_of(source, span.start)),
                    None => failure,
                }
            })?;

            let mut constants = Vec::new();
            flatten("", &file.symbols, &mut constants);
            for (name, value) in constants {
                let value = serde_json::to_value(value).map_err(|e| {
                    BuildFailure::new(format!("symbol '{name}': {e}")).in_entry(entry)
                })?;
                table
                    .define_constant(name, value)
                    .map_err(|e| BuildFailure::new(e.to_string()).in_entry(entry))?;
            }
        }
        tracing::debug!(module = %archive.id(), symbols = table.len(), "loaded symbol tables");
        Ok(table)
    }
}

impl CompilerBackend for SymbolsLoader {
    fn claims(&self, archive: &ScriptArchive) -> bool {
        archive.entries_with_suffix(SYMBOLS_SUFFIX).next().is_some()
    }

    fn build(
        &self,
        archive: &ScriptArchive,
        _boundary: &IsolationBoundary,
        _scratch: &Path,
    ) -> Result<SymbolTable, BuildFailure> {
        self.load(archive)
    }
}

fn flatten<'a>(prefix: &str, table: &'a toml::Table, out: &mut Vec<(String, &'a toml::Value)>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten(&name, nested, out),
            other => out.push((name, other)),
        }
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source
        .get(..offset)
        .map_or(1, |head| head.matches('\n').count() + 1)
}
