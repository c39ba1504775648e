//! Buffered create/delete events.

use std::collections::HashSet;
use std::path::PathBuf;

/// Set of candidate document paths.
pub type PathSet = HashSet<PathBuf>;

/// Create and delete events observed since the seed scan.
///
/// A path is pending on at most one side: recording an event moves it off
/// the other side, so the most recent event wins. Buffers are never
/// drained, which keeps [`EventBuffer::apply`] idempotent against a path
/// set seeded once.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    pending_create: HashSet<PathBuf>,
    pending_delete: HashSet<PathBuf>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` now exists.
    pub fn record_created(&mut self, path: PathBuf) {
        self.pending_delete.remove(&path);
        self.pending_create.insert(path);
    }

    /// Record that `path` no longer exists.
    pub fn record_deleted(&mut self, path: PathBuf) {
        self.pending_create.remove(&path);
        self.pending_delete.insert(path);
    }

    /// Bring `paths` in line with every recorded event.
    pub fn apply(&self, paths: &mut PathSet) {
        for path in &self.pending_create {
            paths.insert(path.clone());
        }
        for path in &self.pending_delete {
            paths.remove(path);
        }
    }

    #[cfg(test)]
    fn is_pending_create(&self, path: &std::path::Path) -> bool {
        self.pending_create.contains(path)
    }

    #[cfg(test)]
    fn is_pending_delete(&self, path: &std::path::Path) -> bool {
        self.pending_delete.contains(path)
    }

    /// Number of pending creates and deletes.
    pub fn counts(&self) -> (usize, usize) {
        (self.pending_create.len(), self.pending_delete.len())
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.pending_create.is_empty() && self.pending_delete.is_empty()
    }
}
