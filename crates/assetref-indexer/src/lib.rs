//! AssetRef Indexer
//!
//! Finds the asset documents (scenes, prefabs) that reference a source file,
//! including:
//! - A candidate document index seeded by one coalesced recursive scan
//! - Buffered create/delete events that keep the index current afterwards
//! - Sidecar uuid resolution and compressed-token search
//! - File watching with debounced updates and sidecar synchronization

pub mod codec;
mod config;
mod error;
pub mod index;
pub mod meta;
mod references;
pub mod scanner;
pub mod watcher;

pub use codec::{CocosUuidCodec, TokenCodec};
pub use config::{IndexConfig, PROJECT_CONFIG_FILE};
pub use error::IndexerError;
pub use index::{AssetIndex, EventBuffer, PathSet, PopulationPhase};
pub use meta::{IdentifierExtractor, SidecarUuid};
pub use references::{ReferenceReport, ReferenceScanner};
pub use scanner::{AssetSource, WalkerSource};
pub use watcher::{ChangeKind, FileChange, FileWatcher, WatcherOptions};
