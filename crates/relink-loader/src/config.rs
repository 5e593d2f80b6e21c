//! Loader configuration.
//!
//! Usually read from the `[loader]` table of `relink.toml`:
//!
//! ```toml
//! [loader]
//! scratch-root = "/var/tmp/relink"
//! build-timeout-ms = 10000
//! max-parallel-builds = 4
//! keep-scratch = false
//! exposed-packages = ["host.text", "host.clock"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// Settings for a [`ModuleLoader`](crate::ModuleLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoaderConfig {
    /// Parent directory for per-build scratch directories. `None` uses the
    /// system temp directory.
    pub scratch_root: Option<PathBuf>,
    /// Upper bound on a single backend invocation.
    pub build_timeout_ms: u64,
    /// How many builds of one tier may run at once.
    pub max_parallel_builds: usize,
    /// Leave scratch directories on disk after the build.
    pub keep_scratch: bool,
    /// Host namespaces any module may be granted. A module sees a host
    /// symbol only if it is inside one of these and inside one of the
    /// module's own allowed imports.
    pub exposed_packages: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            build_timeout_ms: 30_000,
            max_parallel_builds: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            keep_scratch: false,
            exposed_packages: Vec::new(),
        }
    }
}

impl LoaderConfig {
    /// Parse a `[loader]` table body.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: LoaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the loader cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.build_timeout_ms == 0 {
            return Err(LoaderError::InvalidConfig {
                detail: "build-timeout-ms must be positive".into(),
            });
        }
        if self.max_parallel_builds == 0 {
            return Err(LoaderError::InvalidConfig {
                detail: "max-parallel-builds must be at least 1".into(),
            });
        }
        for package in &self.exposed_packages {
            relink_core::symbol::validate_dotted(package).map_err(|reason| {
                LoaderError::InvalidConfig {
                    detail: format!("exposed package '{package}': {reason}"),
                }
            })?;
        }
        Ok(())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    /// Effective build parallelism (never zero).
    pub fn parallelism(&self) -> usize {
        self.max_parallel_builds.max(1)
    }
}
