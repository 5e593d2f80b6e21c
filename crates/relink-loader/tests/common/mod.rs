//! Shared fixtures for loader scenario tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relink_core::{
    BuildFailure, CompilerBackend, CompilerPluginSpec, IsolationBoundary, ModuleId, ModuleSpec,
    PluginId, ScriptArchive, SymbolTable,
};
use relink_loader::{LoaderConfig, ModuleLoader, ModuleLoaderBuilder};
use relink_script::{MixedCompiler, ScriptCompiler, SymbolsLoader};

pub fn id(s: &str) -> ModuleId {
    ModuleId::parse(s).unwrap()
}

pub fn plugin(s: &str) -> PluginId {
    PluginId::new(s).unwrap()
}

/// An archive with one `main.rls` entry, compiled by the script plugin.
pub fn script(name: &str, deps: &[&str], source: &str) -> ScriptArchive {
    let mut spec = ModuleSpec::builder(id(name)).compiler_plugin(plugin("script"));
    for dep in deps {
        spec = spec.dependency(id(dep));
    }
    archive(spec.build().unwrap(), &[("main.rls", source)])
}

pub fn archive(spec: ModuleSpec, entries: &[(&str, &str)]) -> ScriptArchive {
    let mut builder = ScriptArchive::builder(spec);
    for (name, content) in entries {
        builder = builder.entry(*name, content.as_bytes()).unwrap();
    }
    builder.build()
}

/// Loader with the reference backends and default settings.
pub fn loader() -> ModuleLoader {
    builder(LoaderConfig::default()).build().unwrap()
}

/// Builder with the reference backends registered.
pub fn builder(config: LoaderConfig) -> ModuleLoaderBuilder {
    ModuleLoader::builder()
        .config(config)
        .plugin(ScriptCompiler::new().plugin_spec().unwrap())
        .plugin(SymbolsLoader::new().plugin_spec().unwrap())
        .plugin(MixedCompiler::new().plugin_spec().unwrap())
}

/// Backend that sleeps for the number of milliseconds written in its
/// `delay.slow` entry, then produces an empty table.
#[derive(Debug)]
pub struct SlowBackend;

impl SlowBackend {
    pub fn plugin_spec() -> CompilerPluginSpec {
        CompilerPluginSpec::new(plugin("slow"), Arc::new(SlowBackend))
    }

    pub fn archive(name: &str, delay_ms: u64) -> ScriptArchive {
        let spec = ModuleSpec::builder(id(name))
            .compiler_plugin(plugin("slow"))
            .build()
            .unwrap();
        archive(spec, &[("delay.slow", &delay_ms.to_string())])
    }
}

impl CompilerBackend for SlowBackend {
    fn claims(&self, archive: &ScriptArchive) -> bool {
        archive.entry("delay.slow").is_some()
    }

    fn build(
        &self,
        archive: &ScriptArchive,
        _boundary: &IsolationBoundary,
        _scratch: &Path,
    ) -> Result<SymbolTable, BuildFailure> {
        let delay = archive
            .entry("delay.slow")
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| BuildFailure::new("bad delay").in_entry("delay.slow"))?;
        std::thread::sleep(Duration::from_millis(delay));
        Ok(SymbolTable::new())
    }
}
