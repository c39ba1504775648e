//! Reference search over the indexed candidate documents.

use crate::codec::{CocosUuidCodec, TokenCodec};
use crate::meta::{self, IdentifierExtractor, SidecarUuid};
use crate::{AssetIndex, IndexerError};
use memchr::memmem::Finder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const DEFAULT_MAX_CONCURRENT_READS: usize = 64;

/// Result of a reference query.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceReport {
    /// File whose references were searched for
    pub target: PathBuf,
    /// Identifier read from the target's sidecar
    pub uuid: String,
    /// Compressed token searched for
    pub token: String,
    /// Matching documents, sorted by path
    pub matches: Vec<PathBuf>,
    /// Set when the seed scan failed and the index was only partially known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl ReferenceReport {
    pub fn count(&self) -> usize {
        self.matches.len()
    }
}

/// Answers "which candidate documents mention this file?".
///
/// Stateless per query; all state lives in the shared [`AssetIndex`].
#[derive(Clone)]
pub struct ReferenceScanner {
    index: AssetIndex,
    codec: Arc<dyn TokenCodec>,
    extractor: Arc<dyn IdentifierExtractor>,
    max_concurrent_reads: usize,
}

impl ReferenceScanner {
    /// Scanner using the Cocos uuid codec and the sidecar `"uuid"` field.
    pub fn new(index: AssetIndex) -> Self {
        Self {
            index,
            codec: Arc::new(CocosUuidCodec::new()),
            extractor: Arc::new(SidecarUuid::new()),
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
        }
    }

    pub fn with_codec(mut self, codec: impl TokenCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_extractor(mut self, extractor: impl IdentifierExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_max_concurrent_reads(mut self, limit: usize) -> Self {
        self.max_concurrent_reads = limit.max(1);
        self
    }

    pub fn index(&self) -> &AssetIndex {
        &self.index
    }

    /// Find every candidate document that embeds `target`'s token.
    ///
    /// Fails with [`IndexerError::MetadataNotFound`] or
    /// [`IndexerError::IdentifierMissing`] before the index is touched. A
    /// failed seed scan does not fail the query: it is reported through
    /// [`ReferenceReport::degraded`] and the search runs over whatever the
    /// index holds. Unreadable candidates are skipped.
    pub async fn find_references(&self, target: &Path) -> Result<ReferenceReport, IndexerError> {
        let start = Instant::now();

        let uuid = meta::read_identifier(target, self.extractor.as_ref()).await?;
        let token = self.codec.compress(&uuid);
        debug!(target = %target.display(), uuid = %uuid, token = %token, "Resolved token");

        let degraded = match self.index.ensure_fresh().await {
            Ok(()) => None,
            Err(e) => {
                let err = IndexerError::IndexUnavailable(e.to_string());
                warn!(error = %err, "Searching a partial index");
                Some(err.to_string())
            }
        };

        let candidates = self.index.snapshot();
        let scanned = candidates.len();
        let matches = self.scan_candidates(candidates, &token).await;

        info!(
            target = %target.display(),
            scanned,
            matches = matches.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Reference search complete"
        );

        Ok(ReferenceReport {
            target: target.to_path_buf(),
            uuid,
            token,
            matches,
            degraded,
        })
    }

    // Documents are searched as raw bytes; stray non-UTF-8 bytes don't hide a match.
    async fn scan_candidates(&self, candidates: Vec<PathBuf>, token: &str) -> Vec<PathBuf> {
        let finder = Arc::new(Finder::new(token.as_bytes()).into_owned());
        let limit = Arc::new(Semaphore::new(self.max_concurrent_reads));
        let mut reads = JoinSet::new();

        for path in candidates {
            let finder = finder.clone();
            let limit = limit.clone();
            reads.spawn(async move {
                let _permit = limit.acquire_owned().await.ok()?;
                match tokio::fs::read(&path).await {
                    Ok(content) => finder.find(&content).is_some().then_some(path),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable candidate");
                        None
                    }
                }
            });
        }

        let mut matches = Vec::new();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok(Some(path)) => matches.push(path),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Candidate read task failed"),
            }
        }

        matches.sort();
        matches
    }
}
