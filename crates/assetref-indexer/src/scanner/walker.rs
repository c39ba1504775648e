//! Parallel file system walker.

use crate::IndexerError;
use ignore::{WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::debug;

/// File system walker over every file below a root.
///
/// Hidden and ignored files are included: the walk must agree with the
/// watcher, which reports them too.
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    follow_symlinks: bool,
}

impl Walker {
    /// Create a new walker for the given root directory.
    pub fn new(root: &Path, follow_symlinks: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            follow_symlinks,
        }
    }

    /// Walk the directory tree and return every file with `extension`.
    pub fn walk(&self, extension: &str) -> Result<Vec<PathBuf>, IndexerError> {
        if !self.root.is_dir() {
            return Err(IndexerError::Scan(format!(
                "assets directory not found: {}",
                self.root.display()
            )));
        }

        let (tx, rx) = mpsc::channel();

        let walker = WalkBuilder::new(&self.root)
            .follow_links(self.follow_symlinks)
            .standard_filters(false)
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            Box::new(move |result| {
                match result {
                    Ok(entry) => {
                        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                        let matches = entry
                            .path()
                            .extension()
                            .map_or(false, |ext| ext == extension);
                        if is_file && matches {
                            let _ = tx.send(entry.into_path());
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Walk error");
                        // Don't fail the entire walk for individual errors
                    }
                }
                WalkState::Continue
            })
        });

        // Drop the original sender so the receiver knows when we're done
        drop(tx);

        let mut paths: Vec<PathBuf> = rx.into_iter().collect();
        paths.sort();

        Ok(paths)
    }
}
