//! Asset reference index.
//!
//! Holds the set of candidate documents. The set is seeded by a single
//! recursive scan, the first time anyone asks for it, and afterwards only
//! follows buffered create/delete events.
//!
//! ```text
//!  watcher ──record_*──> EventBuffer ─┐
//!                                     ├─ apply ─> PathSet ──> ReferenceScanner
//!  ensure_fresh ──(once)── seed scan ─┘
//! ```

mod events;

pub use events::{EventBuffer, PathSet};

use crate::scanner::{seed_scan, AssetSource, WalkerSource};
use crate::watcher::{ChangeKind, FileChange};
use crate::{IndexConfig, IndexerError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Outcome of the seed scan, shared with every coalesced caller.
type ScanOutcome = Result<(), String>;

/// Population lifecycle; only ever moves forward.
#[derive(Debug)]
enum PopulationState {
    NeverPopulated,
    Populating(watch::Receiver<Option<ScanOutcome>>),
    Populated,
}

/// Observable population phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationPhase {
    NeverPopulated,
    Populating,
    Populated,
}

#[derive(Debug)]
struct IndexState {
    paths: PathSet,
    events: EventBuffer,
    population: PopulationState,
}

impl IndexState {
    fn apply_events(&mut self) {
        self.events.apply(&mut self.paths);
    }
}

struct IndexInner {
    source: Arc<dyn AssetSource>,
    extensions: Vec<String>,
    scope: Option<PathBuf>,
    state: Mutex<IndexState>,
    scans_started: AtomicUsize,
}

/// Shared handle to the candidate document index.
///
/// Cloning is cheap; every clone sees the same state.
#[derive(Clone)]
pub struct AssetIndex {
    inner: Arc<IndexInner>,
}

impl AssetIndex {
    /// Create an index seeded from `source`, one sub-scan per extension.
    pub fn new(source: Arc<dyn AssetSource>, extensions: Vec<String>) -> Self {
        Self::with_scope(source, extensions, None)
    }

    fn with_scope(
        source: Arc<dyn AssetSource>,
        extensions: Vec<String>,
        scope: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(IndexInner {
                source,
                extensions,
                scope,
                state: Mutex::new(IndexState {
                    paths: PathSet::new(),
                    events: EventBuffer::new(),
                    population: PopulationState::NeverPopulated,
                }),
                scans_started: AtomicUsize::new(0),
            }),
        }
    }

    /// Create an index over a project's assets directory.
    ///
    /// The project root is canonicalized so that walked paths and watcher
    /// paths compare equal.
    pub fn for_project(project_root: &Path, config: &IndexConfig) -> Result<Self, IndexerError> {
        let root = project_root
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(project_root.to_path_buf()))?;

        let source = WalkerSource::for_project(&root, config);
        Ok(Self::with_scope(
            Arc::new(source),
            config.extensions.clone(),
            Some(config.assets_root(&root)),
        ))
    }

    /// Make the path set reflect every candidate document as of now.
    ///
    /// The first call runs the seed scan; concurrent callers wait for that
    /// same scan and receive its outcome. Once populated, calls only apply
    /// buffered events and never touch the disk.
    ///
    /// A failed seed scan is reported to every waiter, but the index still
    /// settles as populated with whatever the scan found, and is kept
    /// current from events from then on.
    pub async fn ensure_fresh(&self) -> Result<(), IndexerError> {
        let mut outcome_rx = {
            let mut state = self.inner.state.lock();
            match &state.population {
                PopulationState::Populated => {
                    state.apply_events();
                    return Ok(());
                }
                PopulationState::Populating(rx) => {
                    debug!("Waiting for in-flight seed scan");
                    rx.clone()
                }
                PopulationState::NeverPopulated => {
                    let (tx, rx) = watch::channel(None);
                    state.population = PopulationState::Populating(rx.clone());

                    // Detached so the scan outlives a caller that goes away.
                    let index = self.clone();
                    tokio::spawn(async move { index.populate(tx).await });
                    rx
                }
            }
        };

        let outcome = outcome_rx
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone())
            .map_err(|_| IndexerError::Scan("seed scan ended without a result".to_string()))?;

        match outcome {
            Some(Ok(())) | None => Ok(()),
            Some(Err(message)) => Err(IndexerError::Scan(message)),
        }
    }

    async fn populate(self, tx: watch::Sender<Option<ScanOutcome>>) {
        self.inner.scans_started.fetch_add(1, Ordering::SeqCst);
        info!(extensions = ?self.inner.extensions, "Populating asset index");

        let scan = seed_scan(self.inner.source.clone(), &self.inner.extensions).await;
        let outcome = match scan.failure_message() {
            Some(message) => {
                warn!(error = %message, "Seed scan failed; continuing from events only");
                Err(message)
            }
            None => Ok(()),
        };

        let total = {
            let mut state = self.inner.state.lock();
            state.paths.extend(scan.paths);
            state.apply_events();
            state.population = PopulationState::Populated;
            state.paths.len()
        };
        debug!(total, "Asset index populated");

        tx.send_replace(Some(outcome));
    }

    /// Buffer a create event.
    pub fn record_created(&self, path: PathBuf) {
        debug!(path = %path.display(), "Candidate created");
        self.inner.state.lock().events.record_created(path);
    }

    /// Buffer a delete event.
    pub fn record_deleted(&self, path: PathBuf) {
        debug!(path = %path.display(), "Candidate deleted");
        self.inner.state.lock().events.record_deleted(path);
    }

    /// Buffer a rename as delete of the old path and create of the new one.
    pub fn record_renamed(&self, from: PathBuf, to: PathBuf) {
        debug!(from = %from.display(), to = %to.display(), "Candidate renamed");
        let mut state = self.inner.state.lock();
        state.events.record_deleted(from);
        state.events.record_created(to);
    }

    /// Route a watcher change into the event buffer.
    ///
    /// Paths that are not candidate documents are dropped, as are content
    /// modifications.
    pub fn apply_change(&self, change: &FileChange) {
        match &change.kind {
            ChangeKind::Created if self.is_candidate(&change.path) => {
                self.record_created(change.path.clone())
            }
            ChangeKind::Deleted if self.is_candidate(&change.path) => {
                self.record_deleted(change.path.clone())
            }
            ChangeKind::Renamed { from } => {
                match (self.is_candidate(from), self.is_candidate(&change.path)) {
                    (true, true) => self.record_renamed(from.clone(), change.path.clone()),
                    (true, false) => self.record_deleted(from.clone()),
                    (false, true) => self.record_created(change.path.clone()),
                    (false, false) => {}
                }
            }
            _ => {}
        }
    }

    /// Whether `path` belongs in the index.
    pub fn is_candidate(&self, path: &Path) -> bool {
        let in_scope = self
            .inner
            .scope
            .as_ref()
            .map_or(true, |scope| path.starts_with(scope));
        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| self.inner.extensions.iter().any(|c| c == ext));

        in_scope && has_extension
    }

    /// Sorted copy of the current path set.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.state.lock().paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of indexed candidate documents.
    pub fn len(&self) -> usize {
        self.inner.state.lock().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending creates and deletes in the event buffer.
    pub fn pending_events(&self) -> (usize, usize) {
        self.inner.state.lock().events.counts()
    }

    /// Current population phase.
    pub fn phase(&self) -> PopulationPhase {
        match self.inner.state.lock().population {
            PopulationState::NeverPopulated => PopulationPhase::NeverPopulated,
            PopulationState::Populating(_) => PopulationPhase::Populating,
            PopulationState::Populated => PopulationPhase::Populated,
        }
    }

    /// Number of seed scans started; never more than one.
    pub fn scans_started(&self) -> usize {
        self.inner.scans_started.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AssetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetIndex")
            .field("extensions", &self.inner.extensions)
            .field("scope", &self.inner.scope)
            .field("phase", &self.phase())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::task::JoinSet;

    /// Source that counts calls and answers after a short delay.
    struct CountingSource {
        calls: AtomicUsize,
        paths: Vec<PathBuf>,
        fail: bool,
    }

    impl CountingSource {
        fn new(paths: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                paths: paths.iter().map(PathBuf::from).collect(),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                paths: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl AssetSource for CountingSource {
        async fn find_files(&self, extension: &str) -> Result<Vec<PathBuf>, IndexerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;

            if self.fail {
                return Err(IndexerError::Scan("permission denied".to_string()));
            }
            Ok(self
                .paths
                .iter()
                .filter(|p| p.extension().map_or(false, |e| e == extension))
                .cloned()
                .collect())
        }
    }

    fn extensions() -> Vec<String> {
        vec![
            "scene".to_string(),
            "prefab".to_string(),
            "fire".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_first_call_seeds_index() {
        let source = CountingSource::new(&["/p/a.scene", "/p/b.prefab", "/p/c.txt"]);
        let index = AssetIndex::new(source.clone(), extensions());
        assert_eq!(index.phase(), PopulationPhase::NeverPopulated);

        index.ensure_fresh().await.unwrap();

        assert_eq!(index.phase(), PopulationPhase::Populated);
        assert_eq!(
            index.snapshot(),
            vec![PathBuf::from("/p/a.scene"), PathBuf::from("/p/b.prefab")]
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_ensure_fresh_is_idempotent() {
        let source = CountingSource::new(&["/p/a.scene"]);
        let index = AssetIndex::new(source.clone(), extensions());
        index.record_created(PathBuf::from("/p/new.prefab"));

        index.ensure_fresh().await.unwrap();
        let first = index.snapshot();
        index.ensure_fresh().await.unwrap();

        assert_eq!(index.snapshot(), first);
        assert_eq!(index.scans_started(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_scan() {
        let source = CountingSource::new(&["/p/a.scene", "/p/b.prefab"]);
        let index = AssetIndex::new(source.clone(), extensions());

        let mut callers = JoinSet::new();
        for _ in 0..16 {
            let index = index.clone();
            callers.spawn(async move {
                index.ensure_fresh().await.unwrap();
                index.snapshot()
            });
        }

        let mut snapshots = Vec::new();
        while let Some(result) = callers.join_next().await {
            snapshots.push(result.unwrap());
        }

        assert_eq!(index.scans_started(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), extensions().len());
        assert!(snapshots.iter().all(|s| s == &snapshots[0]));
        assert_eq!(snapshots[0].len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scan_failure_reaches_every_waiter() {
        let source = CountingSource::failing();
        let index = AssetIndex::new(source.clone(), extensions());

        let mut callers = JoinSet::new();
        for _ in 0..8 {
            let index = index.clone();
            callers.spawn(async move { index.ensure_fresh().await });
        }

        let mut messages = Vec::new();
        while let Some(result) = callers.join_next().await {
            match result.unwrap() {
                Err(IndexerError::Scan(message)) => messages.push(message),
                other => panic!("expected scan failure, got {other:?}"),
            }
        }

        assert_eq!(messages.len(), 8);
        assert!(messages.iter().all(|m| m == &messages[0]));
        assert_eq!(index.scans_started(), 1);
        assert_eq!(index.phase(), PopulationPhase::Populated);
    }

    #[tokio::test]
    async fn test_failed_scan_degrades_to_events() {
        let source = CountingSource::failing();
        let index = AssetIndex::new(source.clone(), extensions());

        assert!(index.ensure_fresh().await.is_err());

        index.record_created(PathBuf::from("/p/late.prefab"));
        index.ensure_fresh().await.unwrap();

        assert_eq!(index.snapshot(), vec![PathBuf::from("/p/late.prefab")]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_events_before_scan_win_over_scan() {
        let source = CountingSource::new(&["/p/gone.scene", "/p/kept.scene"]);
        let index = AssetIndex::new(source, extensions());

        index.record_created(PathBuf::from("/p/flicker.prefab"));
        index.record_deleted(PathBuf::from("/p/flicker.prefab"));
        index.record_deleted(PathBuf::from("/p/gone.scene"));
        index.record_deleted(PathBuf::from("/p/back.fire"));
        index.record_created(PathBuf::from("/p/back.fire"));

        index.ensure_fresh().await.unwrap();

        assert_eq!(
            index.snapshot(),
            vec![
                PathBuf::from("/p/back.fire"),
                PathBuf::from("/p/kept.scene"),
            ]
        );
    }

    #[tokio::test]
    async fn test_events_after_population_apply_on_next_call() {
        let source = CountingSource::new(&["/p/a.scene"]);
        let index = AssetIndex::new(source, extensions());
        index.ensure_fresh().await.unwrap();

        index.record_renamed(PathBuf::from("/p/a.scene"), PathBuf::from("/p/b.scene"));
        assert_eq!(index.snapshot(), vec![PathBuf::from("/p/a.scene")]);

        index.ensure_fresh().await.unwrap();
        assert_eq!(index.snapshot(), vec![PathBuf::from("/p/b.scene")]);
        assert_eq!(index.pending_events(), (1, 1));
    }

    #[tokio::test]
    async fn test_apply_change_filters_candidates() {
        let source = CountingSource::new(&[]);
        let index = AssetIndex::new(source, extensions());

        index.apply_change(&FileChange::created("/p/hud.prefab"));
        index.apply_change(&FileChange::created("/p/Player.ts"));
        index.apply_change(&FileChange::created("/p/hud.prefab.meta"));
        index.apply_change(&FileChange {
            path: PathBuf::from("/p/main.scene"),
            kind: ChangeKind::Modified,
        });
        index.apply_change(&FileChange::renamed("/p/hud.prefab", "/p/hud2.prefab"));

        index.ensure_fresh().await.unwrap();
        assert_eq!(index.snapshot(), vec![PathBuf::from("/p/hud2.prefab")]);
    }

    #[tokio::test]
    async fn test_apply_change_rename_across_candidate_boundary() {
        let source = CountingSource::new(&["/p/a.scene", "/p/b.scene"]);
        let index = AssetIndex::new(source, extensions());
        index.ensure_fresh().await.unwrap();

        index.apply_change(&FileChange::renamed("/p/a.scene", "/p/a.scene.bak"));
        index.apply_change(&FileChange::renamed("/p/draft.txt", "/p/c.prefab"));
        index.apply_change(&FileChange::renamed("/p/b.scene", "/p/d.scene"));
        index.ensure_fresh().await.unwrap();

        assert_eq!(
            index.snapshot(),
            vec![PathBuf::from("/p/c.prefab"), PathBuf::from("/p/d.scene")]
        );
        assert_eq!(index.pending_events(), (2, 2));
    }

    #[tokio::test]
    async fn test_seed_scan_and_events_agree_on_hidden_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let assets = temp_dir.path().join("assets");
        std::fs::create_dir_all(assets.join(".backup")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        std::fs::write(temp_dir.path().join(".gitignore"), "assets/.backup/\n").unwrap();
        std::fs::write(assets.join(".backup/old.prefab"), "").unwrap();

        let index = AssetIndex::for_project(temp_dir.path(), &IndexConfig::default()).unwrap();
        index.ensure_fresh().await.unwrap();

        let root = temp_dir.path().canonicalize().unwrap();
        let seeded = root.join("assets/.backup/old.prefab");
        let created = root.join("assets/.backup/new.prefab");
        assert!(index.is_candidate(&created));

        index.apply_change(&FileChange::created(&created));
        index.ensure_fresh().await.unwrap();
        assert_eq!(index.snapshot(), vec![created, seeded]);
    }

    #[test]
    fn test_for_project_scopes_changes() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("assets")).unwrap();

        let index = AssetIndex::for_project(temp_dir.path(), &IndexConfig::default()).unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        assert!(index.is_candidate(&root.join("assets/main.scene")));
        assert!(!index.is_candidate(&root.join("library/main.scene")));
    }

    #[test]
    fn test_for_project_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope");
        let result = AssetIndex::for_project(&missing, &IndexConfig::default());
        assert!(matches!(result, Err(IndexerError::NotFound(_))));
    }
}
