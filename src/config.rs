//! Instrumentation configuration
//!
//! Loaded from a TOML file or built in code. Every field except the two paths
//! has a default, so a minimal file only names the cache file and workspace.
//!
//! ```toml
//! cache_file = ".muestreo/type-cache.json"
//! workspace_root = "/home/me/project"
//! max_samples_per_param = 50
//! max_depth = 10
//! artifact_dirs = ["__pycache__"]
//! test_prefixes = ["test"]
//! third_party_markers = ["site-packages"]
//! ```

use crate::serializer::DEFAULT_MAX_DEPTH;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default bound on samples kept per parameter
pub const DEFAULT_MAX_SAMPLES_PER_PARAM: usize = 50;

/// Configuration for one instrumentation context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Where captured samples are persisted
    pub cache_file: PathBuf,

    /// Only modules under this directory are instrumented
    pub workspace_root: PathBuf,

    /// Ring buffer bound per parameter
    #[serde(default = "default_max_samples")]
    pub max_samples_per_param: usize,

    /// Serializer recursion limit
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Path components that mark compiled-artifact caches
    #[serde(default = "default_artifact_dirs")]
    pub artifact_dirs: Vec<String>,

    /// Path component prefixes that mark test code
    #[serde(default = "default_test_prefixes")]
    pub test_prefixes: Vec<String>,

    /// Substrings of a path component that mark third-party packages
    #[serde(default = "default_third_party_markers")]
    pub third_party_markers: Vec<String>,
}

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES_PER_PARAM
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_artifact_dirs() -> Vec<String> {
    vec!["__pycache__".to_string()]
}

fn default_test_prefixes() -> Vec<String> {
    vec!["test".to_string()]
}

fn default_third_party_markers() -> Vec<String> {
    vec!["site-packages".to_string()]
}

impl InstrumentConfig {
    /// Configuration with default limits and filters
    pub fn new(cache_file: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
            workspace_root: workspace_root.into(),
            max_samples_per_param: default_max_samples(),
            max_depth: default_max_depth(),
            artifact_dirs: default_artifact_dirs(),
            test_prefixes: default_test_prefixes(),
            third_party_markers: default_third_party_markers(),
        }
    }

    /// Override the per-parameter sample bound
    pub fn with_max_samples(mut self, max_samples_per_param: usize) -> Self {
        self.max_samples_per_param = max_samples_per_param;
        self
    }

    /// Override the serializer depth limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break cache invariants
    pub fn validate(&self) -> Result<()> {
        if self.max_samples_per_param == 0 {
            bail!("Invalid max_samples_per_param: 0 (must be >= 1)");
        }
        if self.workspace_root.as_os_str().is_empty() {
            bail!("Invalid configuration: missing workspace_root");
        }
        if self.cache_file.as_os_str().is_empty() {
            bail!("Invalid configuration: missing cache_file");
        }
        Ok(())
    }
}
