//! Module and plugin identifiers.
//!
//! A [`ModuleId`] is the only key used for registry lookups and dependency
//! edges. Its textual form is `name` or `name@version`, where the version is
//! a semantic version.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Identity of a module: a name plus an optional semantic version.
///
/// Ordering is by name, then version (unversioned sorts first).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    name: String,
    version: Option<semver::Version>,
}

impl ModuleId {
    /// An unversioned module id.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            version: None,
        })
    }

    /// A versioned module id.
    pub fn versioned(name: impl Into<String>, version: semver::Version) -> Result<Self> {
        let mut id = Self::new(name)?;
        id.version = Some(version);
        Ok(id)
    }

    /// Parse `name` or `name@1.2.3`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((name, version)) => {
                let version = semver::Version::parse(version).map_err(|e| {
                    CoreError::InvalidModuleId {
                        id: s.to_string(),
                        reason: format!("bad version: {e}"),
                    }
                })?;
                Self::versioned(name, version)
            }
            None => Self::new(s),
        }
    }

    /// The id used for environments that belong to no published module.
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            version: None,
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module version, if any.
    pub fn version(&self) -> Option<&semver::Version> {
        self.version.as_ref()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoreError::InvalidModuleId {
            id: name.to_string(),
            reason: "name is empty".into(),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(CoreError::InvalidModuleId {
            id: name.to_string(),
            reason: format!("illegal character '{c}'"),
        });
    }
    Ok(())
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ModuleId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.to_string()
    }
}

/// Identifier of a registered compiler plugin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginId(String);

impl PluginId {
    /// Create a plugin id. Must be non-empty and free of whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidPluginId {
                reason: "must be non-empty and contain no whitespace".into(),
                id,
            });
        }
        Ok(Self(id))
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PluginId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<PluginId> for String {
    fn from(id: PluginId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_versioned() {
        let plain = ModuleId::parse("hello-helper").unwrap();
        assert_eq!(plain.name(), "hello-helper");
        assert!(plain.version().is_none());

        let versioned = ModuleId::parse("lib.a@1.2.0").unwrap();
        assert_eq!(versioned.name(), "lib.a");
        assert_eq!(versioned.version(), Some(&semver::Version::new(1, 2, 0)));
        assert_eq!(versioned.to_string(), "lib.a@1.2.0");
    }

    #[test]
    fn rejects_bad_names() {
        assert!(ModuleId::parse("").is_err());
        assert!(ModuleId::parse("has space").is_err());
        assert!(ModuleId::parse("a@not-a-version").is_err());
    }

    #[test]
    fn ordering_is_name_then_version() {
        let mut ids = vec![
            ModuleId::parse("b").unwrap(),
            ModuleId::parse("a@2.0.0").unwrap(),
            ModuleId::parse("a").unwrap(),
            ModuleId::parse("a@1.0.0").unwrap(),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a", "a@1.0.0", "a@2.0.0", "b"]);
    }

    #[test]
    fn serde_uses_string_form() {
        let id = ModuleId::parse("lib@0.3.1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"lib@0.3.1\"");
        let back: ModuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn plugin_id_rejects_whitespace() {
        assert!(PluginId::new("script").is_ok());
        assert!(PluginId::new("").is_err());
        assert!(PluginId::new("two words").is_err());
    }
}
