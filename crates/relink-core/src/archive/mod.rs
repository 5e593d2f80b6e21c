//! Script archives: the immutable input describing one module.
//!
//! An archive is a set of named entries (sources, precompiled tables, plain
//! resources) ordered by name, plus the [`ModuleSpec`] declaring what the
//! module needs. Updating a module means submitting a new archive; an
//! archive itself never changes after construction.

mod dir;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::hash::ContentHash;
use crate::id::ModuleId;
use crate::spec::ModuleSpec;

/// File name of the spec inside a directory archive.
pub const SPEC_FILE_NAME: &str = "module.toml";

/// An immutable, order-stable archive.
#[derive(Debug, Clone)]
pub struct ScriptArchive {
    spec: ModuleSpec,
    entries: BTreeMap<String, Arc<[u8]>>,
    hash: ContentHash,
}

impl ScriptArchive {
    /// Start an in-memory archive.
    pub fn builder(spec: ModuleSpec) -> ScriptArchiveBuilder {
        ScriptArchiveBuilder {
            spec,
            entries: BTreeMap::new(),
        }
    }

    /// Module identity declared by the spec.
    pub fn id(&self) -> &ModuleId {
        self.spec.id()
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    /// Bytes of the entry called `name`.
    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(|b| &b[..])
    }

    /// Entry names in order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), &v[..]))
    }

    /// Entries whose name ends with `suffix`.
    pub fn entries_with_suffix<'a>(
        &'a self,
        suffix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        self.entries().filter(move |(name, _)| name.ends_with(suffix))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash over the spec and all entries.
    pub fn content_hash(&self) -> &ContentHash {
        &self.hash
    }
}

/// Builder for in-memory archives.
#[derive(Debug)]
pub struct ScriptArchiveBuilder {
    spec: ModuleSpec,
    entries: BTreeMap<String, Arc<[u8]>>,
}

impl ScriptArchiveBuilder {
    /// Add an entry. Names must be unique relative paths.
    pub fn entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        validate_entry_name(&name)?;
        if self.entries.contains_key(&name) {
            return Err(CoreError::DuplicateEntry(name));
        }
        self.entries.insert(name, Arc::from(bytes.into()));
        Ok(self)
    }

    pub fn build(self) -> ScriptArchive {
        let spec_bytes = serde_json::to_vec(&self.spec).unwrap_or_default();
        let hash = ContentHash::of_chunks(
            std::iter::once(spec_bytes.as_slice()).chain(
                self.entries
                    .iter()
                    .flat_map(|(name, bytes)| [name.as_bytes(), &bytes[..]]),
            ),
        );
        ScriptArchive {
            spec: self.spec,
            entries: self.entries,
            hash,
        }
    }
}

fn validate_entry_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with('/') || name.contains('\\') {
        Some("must be a relative path using '/'")
    } else if name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        Some("contains an empty, '.' or '..' segment")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(CoreError::InvalidEntry {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
