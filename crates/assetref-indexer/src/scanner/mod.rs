//! Seed scan of candidate documents.
//!
//! The index asks an [`AssetSource`] for every file of each candidate
//! extension exactly once per process; the per-extension sub-scans run in
//! parallel and their results are unioned.

mod walker;

pub use walker::Walker;

use crate::{IndexConfig, IndexerError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Recursive find primitive used to seed the index.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Every candidate document with the given extension.
    async fn find_files(&self, extension: &str) -> Result<Vec<PathBuf>, IndexerError>;
}

/// [`AssetSource`] backed by an unfiltered parallel directory walk.
#[derive(Debug, Clone)]
pub struct WalkerSource {
    walker: Walker,
}

impl WalkerSource {
    /// Walk `root` and everything below it.
    pub fn new(root: &Path, follow_symlinks: bool) -> Self {
        Self {
            walker: Walker::new(root, follow_symlinks),
        }
    }

    /// Walk the configured assets directory of a project.
    pub fn for_project(project_root: &Path, config: &IndexConfig) -> Self {
        Self::new(&config.assets_root(project_root), config.follow_symlinks)
    }
}

#[async_trait]
impl AssetSource for WalkerSource {
    async fn find_files(&self, extension: &str) -> Result<Vec<PathBuf>, IndexerError> {
        let walker = self.walker.clone();
        let extension = extension.to_string();

        tokio::task::spawn_blocking(move || walker.walk(&extension))
            .await
            .map_err(|e| IndexerError::Scan(format!("walk task failed: {e}")))?
    }
}

/// Outcome of a seed scan.
///
/// Sub-scans that succeeded still contribute their paths when another
/// sub-scan failed.
#[derive(Debug, Default)]
pub struct SeedScan {
    /// Union of every discovered path
    pub paths: HashSet<PathBuf>,
    /// One message per failed sub-scan
    pub failures: Vec<String>,
    /// Scan duration in milliseconds
    pub duration_ms: u64,
}

impl SeedScan {
    /// Collapse the failures into a single message, if any.
    pub fn failure_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        }
    }
}

/// Run one sub-scan per extension in parallel and union the results.
pub async fn seed_scan(source: Arc<dyn AssetSource>, extensions: &[String]) -> SeedScan {
    let start = Instant::now();
    let mut tasks = JoinSet::new();

    for extension in extensions {
        let source = source.clone();
        let extension = extension.clone();
        tasks.spawn(async move {
            let result = source.find_files(&extension).await;
            (extension, result)
        });
    }

    let mut scan = SeedScan::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((extension, Ok(paths))) => {
                debug!(extension = %extension, count = paths.len(), "Sub-scan complete");
                scan.paths.extend(paths);
            }
            Ok((extension, Err(e))) => {
                warn!(extension = %extension, error = %e, "Sub-scan failed");
                scan.failures.push(format!("{extension}: {e}"));
            }
            Err(e) => {
                warn!(error = %e, "Sub-scan task panicked");
                scan.failures.push(e.to_string());
            }
        }
    }
    // Join order is arbitrary; keep the failure message stable.
    scan.failures.sort();

    scan.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        files = scan.paths.len(),
        failures = scan.failures.len(),
        duration_ms = scan.duration_ms,
        "Seed scan complete"
    );

    scan
}
