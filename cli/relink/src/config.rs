//! `relink.toml` parsing and loader construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relink_core::{CompilerPluginSpec, PluginId, SymbolTable};
use relink_loader::{LoaderConfig, ModuleLoader};
use relink_script::{MixedCompiler, ScriptCompiler, SymbolsLoader};
use serde::Deserialize;

/// File looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "relink.toml";

/// Top-level `relink.toml` structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelinkConfig {
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Registered plugins. Empty means the reference backends under their
    /// default ids.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// One `[[plugins]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginConfig {
    pub id: String,
    pub backend: BackendKind,
    /// Only meaningful for backends that compile scripts.
    #[serde(default = "default_link_check")]
    pub link_check: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_link_check() -> bool {
    true
}

/// Which reference backend a plugin entry instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Script,
    Symbols,
    Mixed,
}

impl RelinkConfig {
    /// Load the explicit config path, or `relink.toml` in `cwd` if present,
    /// or defaults.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = cwd.join(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    return Ok((Self::default(), None));
                }
                candidate
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config =
            Self::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok((config, Some(path)))
    }

    pub fn from_str(s: &str) -> Result<Self> {
        let config: RelinkConfig = toml::from_str(s)?;
        config.loader.validate()?;
        Ok(config)
    }

    /// Plugin registrations in declaration order.
    pub fn plugin_specs(&self) -> Result<Vec<CompilerPluginSpec>> {
        if self.plugins.is_empty() {
            return Ok(vec![
                ScriptCompiler::new().plugin_spec()?,
                SymbolsLoader::new().plugin_spec()?,
                MixedCompiler::new().plugin_spec()?,
            ]);
        }
        self.plugins
            .iter()
            .map(|entry| -> Result<CompilerPluginSpec> {
                let id = PluginId::new(entry.id.as_str())
                    .with_context(|| format!("plugin '{}'", entry.id))?;
                let spec = match entry.backend {
                    BackendKind::Script => ScriptCompiler::new()
                        .with_link_check(entry.link_check)
                        .plugin_spec_with_id(id)?,
                    BackendKind::Symbols => SymbolsLoader::new().plugin_spec_with_id(id)?,
                    BackendKind::Mixed => MixedCompiler::new()
                        .with_link_check(entry.link_check)
                        .plugin_spec_with_id(id)?,
                };
                Ok(entry
                    .metadata
                    .iter()
                    .fold(spec, |spec, (k, v)| spec.with_metadata(k.as_str(), v.as_str())))
            })
            .collect()
    }

    /// A loader with this configuration, the configured plugins and the
    /// given host symbols.
    pub fn build_loader(&self, host: &SymbolTable) -> Result<ModuleLoader> {
        let builder = self
            .plugin_specs()?
            .into_iter()
            .fold(ModuleLoader::builder().config(self.loader.clone()), |b, p| b.plugin(p));
        Ok(builder.host_symbols(host).build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = RelinkConfig::from_str(
            r#"
[loader]
build-timeout-ms = 500
max-parallel-builds = 2
exposed-packages = ["host.clock"]

[[plugins]]
id = "rls"
backend = "script"
link-check = false

[[plugins]]
id = "tables"
backend = "symbols"
metadata = { owner = "ops" }

[[plugins]]
id = "both"
backend = "mixed"
"#,
        )
        .unwrap();
        assert_eq!(config.loader.build_timeout_ms, 500);
        assert_eq!(config.loader.exposed_packages, ["host.clock"]);

        let specs = config.plugin_specs().unwrap();
        let ids: Vec<_> = specs.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, ["rls", "tables", "both"]);
        assert_eq!(specs[0].metadata()["link-check"], "false");
        assert_eq!(specs[1].metadata()["owner"], "ops");
    }

    #[test]
    fn empty_config_registers_reference_backends() {
        let config = RelinkConfig::from_str("").unwrap();
        let specs = config.plugin_specs().unwrap();
        let ids: Vec<_> = specs.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, ["script", "symbols", "mixed"]);
    }

    #[test]
    fn reject_bad_values() {
        assert!(RelinkConfig::from_str("[loader]\nmax-parallel-builds = 0\n").is_err());
        assert!(RelinkConfig::from_str("[[plugins]]\nid = \"x\"\nbackend = \"wasm\"\n").is_err());
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = RelinkConfig::load(None, dir.path()).unwrap();
        assert!(path.is_none());
        assert!(config.plugins.is_empty());

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[loader]\nkeep-scratch = true\n",
        )
        .unwrap();
        let (config, path) = RelinkConfig::load(None, dir.path()).unwrap();
        assert_eq!(path, Some(dir.path().join(CONFIG_FILE_NAME)));
        assert!(config.loader.keep_scratch);

        assert!(RelinkConfig::load(Some(&dir.path().join("missing.toml")), dir.path()).is_err());
    }
}
