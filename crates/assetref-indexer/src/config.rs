//! Configuration for the asset reference index.

use crate::IndexerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project config file, looked up in the project root.
pub const PROJECT_CONFIG_FILE: &str = ".assetref.yaml";

/// Index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Project subtree holding candidate documents, relative to the project root
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Extensions of candidate documents (one seed sub-scan per extension)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extensions of files that may be queried for references
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Upper bound on candidate files read concurrently during a query
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,

    /// Whether the seed scan follows symlinks
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Keep `.meta` sidecars in step with deleted and renamed files
    #[serde(default = "default_meta_sync")]
    pub meta_sync: bool,

    /// Delay before the watch loop pre-populates the index
    #[serde(default = "default_warmup_delay_ms")]
    pub warmup_delay_ms: u64,

    /// Watcher debounce window
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_extensions() -> Vec<String> {
    vec![
        "fire".to_string(),
        "scene".to_string(),
        "prefab".to_string(),
    ]
}

fn default_source_extensions() -> Vec<String> {
    vec!["ts".to_string(), "js".to_string()]
}

fn default_max_concurrent_reads() -> usize {
    64
}

fn default_meta_sync() -> bool {
    true
}

fn default_warmup_delay_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            extensions: default_extensions(),
            source_extensions: default_source_extensions(),
            max_concurrent_reads: default_max_concurrent_reads(),
            follow_symlinks: false,
            meta_sync: default_meta_sync(),
            warmup_delay_ms: default_warmup_delay_ms(),
            debounce_ms: default_debounce_ms(),
            log_level: default_log_level(),
        }
    }
}

impl IndexConfig {
    /// Load configuration for a project, falling back to defaults.
    ///
    /// The project file wins over the user config file; unreadable or
    /// malformed files are logged and skipped.
    pub fn load(project_root: &Path) -> Self {
        let candidates = [
            Some(project_root.join(PROJECT_CONFIG_FILE)),
            dirs::config_dir().map(|dir| dir.join("assetref").join("config.yaml")),
        ];

        for path in candidates.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "Loaded config");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to load config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Absolute assets directory for a project root
    pub fn assets_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.assets_dir)
    }

    /// Whether `path` may be the target of a reference query
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.source_extensions.iter().any(|candidate| candidate == ext))
            .unwrap_or(false)
    }
}
