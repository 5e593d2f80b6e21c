//! Declared requirements of a script archive.
//!
//! A [`ModuleSpec`] names the module, the modules it depends on, the
//! compiler plugins allowed to process it (in priority order), the host
//! namespaces it may import, and free-form metadata. On disk it is a
//! `module.toml` file:
//!
//! ```toml
//! [module]
//! id = "app@1.0.0"
//! dependencies = ["lib.a"]
//! compiler-plugins = ["script"]
//! allowed-imports = ["host.text"]
//!
//! [metadata]
//! owner = "payments"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::id::{ModuleId, PluginId};
use crate::symbol::validate_dotted;

/// Requirements declared by an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleSpec {
    id: ModuleId,
    dependencies: Vec<ModuleId>,
    compiler_plugins: Vec<PluginId>,
    allowed_imports: Vec<String>,
    metadata: BTreeMap<String, String>,
}

impl ModuleSpec {
    /// Start building a spec for `id`.
    pub fn builder(id: ModuleId) -> ModuleSpecBuilder {
        ModuleSpecBuilder {
            spec: ModuleSpec {
                id,
                dependencies: Vec::new(),
                compiler_plugins: Vec::new(),
                allowed_imports: Vec::new(),
                metadata: BTreeMap::new(),
            },
        }
    }

    /// A spec with no dependencies, plugins or imports.
    pub fn empty(id: ModuleId) -> Self {
        Self::builder(id).spec
    }

    /// Parse a `module.toml` document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: SpecFile = toml::from_str(content)?;
        let mut builder = ModuleSpec::builder(file.module.id);
        for dep in file.module.dependencies {
            builder = builder.dependency(dep);
        }
        for plugin in file.module.compiler_plugins {
            builder = builder.compiler_plugin(plugin);
        }
        for prefix in file.module.allowed_imports {
            builder = builder.allow_import(prefix);
        }
        for (key, value) in file.metadata {
            builder = builder.metadata(key, value);
        }
        builder.build()
    }

    /// Module identity.
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Declared dependencies, in declaration order.
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    /// Compiler plugins allowed to process the archive, highest priority first.
    pub fn compiler_plugins(&self) -> &[PluginId] {
        &self.compiler_plugins
    }

    /// Host namespace prefixes the module may import. Empty means none.
    pub fn allowed_imports(&self) -> &[String] {
        &self.allowed_imports
    }

    /// Free-form metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Whether the module declares `plugin`.
    pub fn declares_plugin(&self, plugin: &PluginId) -> bool {
        self.compiler_plugins.contains(plugin)
    }
}

/// Builder for [`ModuleSpec`].
#[derive(Debug, Clone)]
pub struct ModuleSpecBuilder {
    spec: ModuleSpec,
}

impl ModuleSpecBuilder {
    /// Declare a dependency. Repeats are ignored.
    pub fn dependency(mut self, id: ModuleId) -> Self {
        if !self.spec.dependencies.contains(&id) {
            self.spec.dependencies.push(id);
        }
        self
    }

    /// Allow a compiler plugin. Earlier calls take priority.
    pub fn compiler_plugin(mut self, id: PluginId) -> Self {
        if !self.spec.compiler_plugins.contains(&id) {
            self.spec.compiler_plugins.push(id);
        }
        self
    }

    /// Allow imports from a host namespace prefix such as `host.text`.
    pub fn allow_import(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !self.spec.allowed_imports.contains(&prefix) {
            self.spec.allowed_imports.push(prefix);
        }
        self
    }

    /// Attach a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and finish.
    pub fn build(self) -> Result<ModuleSpec> {
        let spec = self.spec;
        if spec.dependencies.contains(&spec.id) {
            return Err(CoreError::SelfDependency(spec.id));
        }
        for prefix in &spec.allowed_imports {
            validate_dotted(prefix).map_err(|reason| CoreError::InvalidSpec {
                detail: format!("allowed import '{prefix}': {reason}"),
            })?;
        }
        Ok(spec)
    }
}

#[derive(Debug, Deserialize)]
struct SpecFile {
    module: ModuleSection,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ModuleSection {
    id: ModuleId,
    #[serde(default)]
    dependencies: Vec<ModuleId>,
    #[serde(default)]
    compiler_plugins: Vec<PluginId>,
    #[serde(default)]
    allowed_imports: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleId {
        ModuleId::parse(s).unwrap()
    }

    #[test]
    fn builder_deduplicates_in_order() {
        let spec = ModuleSpec::builder(id("app"))
            .dependency(id("lib.b"))
            .dependency(id("lib.a"))
            .dependency(id("lib.b"))
            .compiler_plugin(PluginId::new("script").unwrap())
            .build()
            .unwrap();
        assert_eq!(spec.dependencies(), &[id("lib.b"), id("lib.a")]);
        assert_eq!(spec.compiler_plugins().len(), 1);
    }

    #[test]
    fn self_dependency_rejected() {
        let err = ModuleSpec::builder(id("loop"))
            .dependency(id("loop"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::SelfDependency(_)));
    }

    #[test]
    fn bad_import_prefix_rejected() {
        let result = ModuleSpec::builder(id("app")).allow_import("pkg..x").build();
        assert!(result.is_err());
    }

    #[test]
    fn parse_module_toml() {
        let spec = ModuleSpec::from_toml(
            r#"
[module]
id = "app@1.0.0"
dependencies = ["lib.a", "lib.b@2.0.0"]
compiler-plugins = ["script", "symbols"]
allowed-imports = ["host.text"]

[metadata]
owner = "payments"
"#,
        )
        .unwrap();
        assert_eq!(spec.id(), &id("app@1.0.0"));
        assert_eq!(spec.dependencies(), &[id("lib.a"), id("lib.b@2.0.0")]);
        assert_eq!(spec.compiler_plugins()[1].as_str(), "symbols");
        assert_eq!(spec.allowed_imports(), &["host.text".to_string()]);
        assert_eq!(spec.metadata().get("owner").map(String::as_str), Some("payments"));
    }

    #[test]
    fn parse_minimal_module_toml() {
        let spec = ModuleSpec::from_toml("[module]\nid = \"solo\"\n").unwrap();
        assert!(spec.dependencies().is_empty());
        assert!(spec.allowed_imports().is_empty());
    }

    #[test]
    fn parse_rejects_self_dependency() {
        let result = ModuleSpec::from_toml("[module]\nid = \"a\"\ndependencies = [\"a\"]\n");
        assert!(result.is_err());
    }
}
