//! Directory-backed archives.

use std::fs;
use std::path::Path;

use super::{ScriptArchive, SPEC_FILE_NAME};
use crate::error::{CoreError, Result};
use crate::id::ModuleId;
use crate::spec::ModuleSpec;

impl ScriptArchive {
    /// Load an archive from a directory.
    ///
    /// The spec is read from `module.toml` at the root. Without one, the
    /// module is named after the directory and declares nothing. Every other
    /// file below the root becomes an entry named by its `/`-separated
    /// relative path.
    pub fn from_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(CoreError::ArchiveRead {
                path: root.to_path_buf(),
                detail: "not a directory".into(),
            });
        }

        let spec_path = root.join(SPEC_FILE_NAME);
        let spec = if spec_path.is_file() {
            ModuleSpec::from_toml(&fs::read_to_string(&spec_path)?)?
        } else {
            let name = root
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| CoreError::ArchiveRead {
                    path: root.to_path_buf(),
                    detail: "directory name is not valid UTF-8".into(),
                })?;
            ModuleSpec::empty(ModuleId::new(name)?)
        };

        let mut files = Vec::new();
        collect_files(root, root, &mut files)?;
        files.sort();

        let mut builder = ScriptArchive::builder(spec);
        for name in files {
            if name == SPEC_FILE_NAME {
                continue;
            }
            let bytes = fs::read(root.join(&name))?;
            builder = builder.entry(name, bytes)?;
        }
        Ok(builder.build())
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|e| CoreError::ArchiveRead {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        let segments: Option<Vec<&str>> =
            relative.components().map(|c| c.as_os_str().to_str()).collect();
        match segments {
            Some(segments) => out.push(segments.join("/")),
            None => {
                return Err(CoreError::ArchiveRead {
                    path,
                    detail: "file name is not valid UTF-8".into(),
                })
            }
        }
    }
    Ok(())
}
