//! File system watcher for keeping the index current.
//!
//! Uses FSEvents on macOS and inotify on Linux, debounced, and reduces raw
//! notify events to create/modify/delete/rename changes.

use crate::{meta, AssetIndex, IndexerError};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// File change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// File was created
    Created,
    /// File content was modified
    Modified,
    /// File was deleted
    Deleted,
    /// File was moved here from `from`
    Renamed { from: PathBuf },
}

/// A file system change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path to the changed file (the new path for renames)
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Created,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Deleted,
        }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            path: to.into(),
            kind: ChangeKind::Renamed { from: from.into() },
        }
    }
}

/// Options for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Debounce duration
    pub debounce_duration: Duration,
    /// Whether to watch recursively
    pub recursive: bool,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
            recursive: true,
        }
    }
}

/// File system watcher with debouncing.
pub struct FileWatcher {
    options: WatcherOptions,
    tx: mpsc::Sender<FileChange>,
    rx: mpsc::Receiver<FileChange>,
    _debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl FileWatcher {
    /// Create a new file watcher.
    pub fn new(options: WatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        Self {
            options,
            tx,
            rx,
            _debouncer: None,
        }
    }

    /// Start watching a directory.
    pub fn watch(&mut self, path: &Path) -> Result<(), IndexerError> {
        let path = path
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(path.to_path_buf()))?;

        let tx = self.tx.clone();

        let mut debouncer = new_debouncer(
            self.options.debounce_duration,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        for change in convert_event(&event.event) {
                            if let Err(e) = tx.blocking_send(change) {
                                error!(error = %e, "Failed to send change event");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
            },
        )
        .map_err(|e| IndexerError::Watcher(e.to_string()))?;

        let mode = if self.options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        debouncer
            .watch(&path, mode)
            .map_err(|e: notify::Error| IndexerError::Watcher(e.to_string()))?;

        info!(path = ?path, recursive = self.options.recursive, "Started watching");

        self._debouncer = Some(debouncer);

        Ok(())
    }

    /// Receive the next change event.
    pub async fn next(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }
}

/// Convert a notify Event to our FileChanges.
fn convert_event(event: &Event) -> Vec<FileChange> {
    let Some(first) = event.paths.first() else {
        return Vec::new();
    };

    let changes = match &event.kind {
        EventKind::Create(_) => vec![FileChange::created(first.clone())],
        EventKind::Remove(_) => vec![FileChange::deleted(first.clone())],
        EventKind::Modify(ModifyKind::Name(mode)) => convert_rename(*mode, &event.paths),
        EventKind::Modify(_) => vec![FileChange {
            path: first.clone(),
            kind: ChangeKind::Modified,
        }],
        EventKind::Any => return Vec::new(),
        EventKind::Access(_) => return Vec::new(), // Ignore access events
        EventKind::Other => return Vec::new(),
    };

    changes
        .into_iter()
        // Directories only matter when moved; their sidecars follow them
        .filter(|change| {
            matches!(change.kind, ChangeKind::Renamed { .. } | ChangeKind::Deleted)
                || !change.path.is_dir()
        })
        .inspect(|change| debug!(path = ?change.path, kind = ?change.kind, "File change detected"))
        .collect()
}

fn convert_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<FileChange> {
    match (mode, paths) {
        (RenameMode::Both, [from, to, ..]) => vec![FileChange::renamed(from.clone(), to.clone())],
        (RenameMode::From, [from, ..]) => vec![FileChange::deleted(from.clone())],
        (RenameMode::To, [to, ..]) => vec![FileChange::created(to.clone())],
        // Unpaired renames: whether the path still exists tells which side it was
        (_, [path, ..]) if path.exists() => vec![FileChange::created(path.clone())],
        (_, [path, ..]) => vec![FileChange::deleted(path.clone())],
        (_, []) => Vec::new(),
    }
}

/// Route one change into the index and, when enabled, keep sidecars in step.
///
/// Sidecar sync checks the disk as it is now, not as the event describes it:
/// a delete or rename that was undone by a later write leaves the sidecar.
pub async fn handle_change(index: &AssetIndex, change: &FileChange, meta_sync: bool) {
    index.apply_change(change);

    if !meta_sync {
        return;
    }

    let result = match &change.kind {
        ChangeKind::Deleted => meta::remove_sidecar(&change.path).await,
        ChangeKind::Renamed { from } => meta::rename_sidecar(from, &change.path).await,
        ChangeKind::Created | ChangeKind::Modified => return,
    };

    if let Err(e) = result {
        warn!(path = %change.path.display(), error = %e, "Sidecar sync failed");
    }
}

/// Forward changes from `watcher` into `index` until the watcher closes.
pub async fn forward_changes(mut watcher: FileWatcher, index: AssetIndex, meta_sync: bool) {
    while let Some(change) = watcher.next().await {
        handle_change(&index, &change, meta_sync).await;
    }
    debug!("Watcher channel closed");
}
