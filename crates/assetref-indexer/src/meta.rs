//! `.meta` sidecar handling.
//!
//! Every asset `F` has its metadata at `F.meta`, a small text file that
//! carries the asset uuid in a `"uuid": "<dashed hex>"` field.

use crate::IndexerError;
use regex::Regex;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Suffix appended to an asset path to locate its sidecar.
pub const META_SUFFIX: &str = ".meta";

const UUID_PATTERN: &str = concat!(
    r#""uuid":\s*"("#,
    r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    r#")""#,
);

/// Pulls the asset identifier out of sidecar text.
pub trait IdentifierExtractor: Send + Sync {
    /// Return the identifier, or `None` when the text carries none.
    fn extract(&self, content: &str) -> Option<String>;
}

impl<F> IdentifierExtractor for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn extract(&self, content: &str) -> Option<String> {
        self(content)
    }
}

/// Regex extraction of the `"uuid"` field.
#[derive(Debug, Clone)]
pub struct SidecarUuid {
    pattern: Regex,
}

impl SidecarUuid {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(UUID_PATTERN).expect("uuid pattern is a valid regex"),
        }
    }
}

impl Default for SidecarUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierExtractor for SidecarUuid {
    fn extract(&self, content: &str) -> Option<String> {
        self.pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Sidecar path for an asset.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(META_SUFFIX);
    PathBuf::from(raw)
}

/// Whether `path` is itself a sidecar.
pub fn is_sidecar(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "meta")
}

/// Read the identifier recorded in `target`'s sidecar.
pub async fn read_identifier(
    target: &Path,
    extractor: &dyn IdentifierExtractor,
) -> Result<String, IndexerError> {
    let meta = sidecar_path(target);

    let content = match tokio::fs::read_to_string(&meta).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(IndexerError::MetadataNotFound(meta))
        }
        Err(e) => return Err(e.into()),
    };

    extractor
        .extract(&content)
        .ok_or(IndexerError::IdentifierMissing(meta))
}

/// Delete the sidecar of a deleted asset.
///
/// Nothing is removed while the asset is still on disk, so a save that
/// replaces the file through a temporary name keeps its sidecar.
/// Returns whether a sidecar was removed.
pub async fn remove_sidecar(path: &Path) -> Result<bool, IndexerError> {
    if is_sidecar(path) {
        return Ok(false);
    }
    if tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "Asset still exists, keeping sidecar");
        return Ok(false);
    }

    let meta = sidecar_path(path);
    match tokio::fs::remove_file(&meta).await {
        Ok(()) => {
            info!(path = %meta.display(), "Removed sidecar");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %meta.display(), "No sidecar to remove");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Move the sidecar of a renamed asset next to its new path.
///
/// The move is skipped when `from` exists again or `to` already has a
/// sidecar. Returns whether a sidecar was moved.
pub async fn rename_sidecar(from: &Path, to: &Path) -> Result<bool, IndexerError> {
    if is_sidecar(from) || is_sidecar(to) {
        return Ok(false);
    }

    let old_meta = sidecar_path(from);
    let new_meta = sidecar_path(to);
    if tokio::fs::try_exists(from).await? || tokio::fs::try_exists(&new_meta).await? {
        debug!(from = %from.display(), to = %to.display(), "Rename superseded, keeping sidecar");
        return Ok(false);
    }
    match tokio::fs::rename(&old_meta, &new_meta).await {
        Ok(()) => {
            info!(from = %old_meta.display(), to = %new_meta.display(), "Renamed sidecar");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %old_meta.display(), "No sidecar to rename");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const META: &str = r#"{
  "ver": "1.0.8",
  "uuid": "2d2f792f-a40c-49bb-a189-ed176a246e49",
  "isPlugin": false,
  "subMetas": {}
}"#;

    #[test]
    fn test_sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/p/assets/Player.ts")),
            PathBuf::from("/p/assets/Player.ts.meta")
        );
    }

    #[test]
    fn test_is_sidecar() {
        assert!(is_sidecar(Path::new("Player.ts.meta")));
        assert!(!is_sidecar(Path::new("Player.ts")));
    }

    #[test]
    fn test_extract_uuid() {
        let extractor = SidecarUuid::new();
        assert_eq!(
            extractor.extract(META).as_deref(),
            Some("2d2f792f-a40c-49bb-a189-ed176a246e49")
        );
    }

    #[test]
    fn test_extract_rejects_malformed_uuid() {
        let extractor = SidecarUuid::new();
        assert!(extractor.extract(r#"{"uuid": "2d2f792f-a40c"}"#).is_none());
        assert!(extractor.extract(r#"{"ver": "1.0.8"}"#).is_none());
    }

    #[tokio::test]
    async fn test_read_identifier_missing_sidecar() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("Player.ts");
        std::fs::write(&target, "export class Player {}").unwrap();

        let result = read_identifier(&target, &SidecarUuid::new()).await;
        assert!(matches!(result, Err(IndexerError::MetadataNotFound(_))));
    }

    #[tokio::test]
    async fn test_read_identifier_without_uuid() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("Player.ts");
        std::fs::write(sidecar_path(&target), r#"{"ver": "1.0.8"}"#).unwrap();

        let result = read_identifier(&target, &SidecarUuid::new()).await;
        assert!(matches!(result, Err(IndexerError::IdentifierMissing(_))));
    }

    #[tokio::test]
    async fn test_read_identifier() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("Player.ts");
        std::fs::write(sidecar_path(&target), META).unwrap();

        let uuid = read_identifier(&target, &SidecarUuid::new()).await.unwrap();
        assert_eq!(uuid, "2d2f792f-a40c-49bb-a189-ed176a246e49");
    }

    #[tokio::test]
    async fn test_remove_sidecar() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("Player.ts");
        std::fs::write(sidecar_path(&target), META).unwrap();

        assert!(remove_sidecar(&target).await.unwrap());
        assert!(!sidecar_path(&target).exists());
        assert!(!remove_sidecar(&target).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_sidecar() {
        let temp_dir = tempdir().unwrap();
        let from = temp_dir.path().join("Player.ts");
        let to = temp_dir.path().join("Hero.ts");
        std::fs::write(sidecar_path(&from), META).unwrap();

        assert!(rename_sidecar(&from, &to).await.unwrap());
        assert!(!sidecar_path(&from).exists());
        assert_eq!(std::fs::read_to_string(sidecar_path(&to)).unwrap(), META);
    }

    #[tokio::test]
    async fn test_remove_sidecar_keeps_existing_asset() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("Player.ts");
        std::fs::write(&target, "export class Player {}").unwrap();
        std::fs::write(sidecar_path(&target), META).unwrap();

        assert!(!remove_sidecar(&target).await.unwrap());
        assert!(sidecar_path(&target).exists());
    }

    #[tokio::test]
    async fn test_rename_sidecar_skipped_when_superseded() {
        let temp_dir = tempdir().unwrap();
        let from = temp_dir.path().join("Player.ts");
        let to = temp_dir.path().join("Hero.ts");
        std::fs::write(sidecar_path(&from), META).unwrap();
        std::fs::write(sidecar_path(&to), "{}").unwrap();

        // Target already has its own sidecar
        assert!(!rename_sidecar(&from, &to).await.unwrap());
        assert_eq!(std::fs::read_to_string(sidecar_path(&to)).unwrap(), "{}");

        // Source was written back after the rename
        std::fs::remove_file(sidecar_path(&to)).unwrap();
        std::fs::write(&from, "export class Player {}").unwrap();
        assert!(!rename_sidecar(&from, &to).await.unwrap());
        assert!(sidecar_path(&from).exists());
        assert!(!sidecar_path(&to).exists());
    }

    #[tokio::test]
    async fn test_sidecars_are_not_synced() {
        let temp_dir = tempdir().unwrap();
        let meta = temp_dir.path().join("Player.ts.meta");
        std::fs::write(sidecar_path(&meta), "nested").unwrap();

        assert!(!remove_sidecar(&meta).await.unwrap());
        assert!(sidecar_path(&meta).exists());
    }
}
