//! cardsync core - headless indexing and synchronization for character card
//! libraries.
//!
//! Character cards are PNG images carrying an embedded JSON payload. This
//! crate keeps a SQLite index of the cards under one or more library roots in
//! step with the filesystem, and derives thumbnails and regex search results
//! from it.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardsync_core::{CardQuery, CardSync, ScanOrigin};
//!
//! #[tokio::main]
//! async fn main() -> cardsync_core::Result<()> {
//!     let sync = CardSync::new("/path/to/data").await?;
//!
//!     let result = sync.scan_now(ScanOrigin::Manual, "/path/to/cards".as_ref()).await?;
//!     println!("Indexed {} files", result.processed_files);
//!
//!     let page = sync.list_cards(&CardQuery {
//!         text: Some("dragon".into()),
//!         ..Default::default()
//!     })?;
//!     println!("{} cards mention dragons", page.total_count);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod index;
pub mod metadata;
pub mod parser;
pub mod pattern;
pub mod scan;
pub mod sync;
pub mod thumbnail;
pub mod watch;

mod api;

// Re-export commonly used types
pub use config::{
    JsonSettingsProvider, LibraryRootSettings, SettingsProvider, StaticSettingsProvider,
    SyncSettings,
};
pub use error::{CardSyncError, Result};
pub use events::{EventBus, SyncEvent};
pub use identity::content_hash;
pub use index::{
    CardFileRecord, CardIndex, CardPage, CardQuery, CardRecord, LibraryRecord, LibraryStats,
    PatternCacheEntry, PatternCacheStatus, PatternMatchRecord,
};
pub use parser::{parse_card_file, ParseError, ParsedCard};
pub use pattern::{rule_set_hash, PatternRule, PatternRunOutcome, PatternRunner};
pub use scan::{ScanEngine, ScanMode, ScanOrigin, ScanResult};
pub use sync::{RequestSequencer, RequestTicket, SyncOrchestrator};
pub use thumbnail::{
    ImageThumbnailGenerator, ThumbnailError, ThumbnailGenerator, ThumbnailQueue, ThumbnailSweep,
};
pub use watch::{WatchDiff, WatchService, WatchTarget};

pub use api::CardSyncBuilder;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;

/// One per process: owns the index and every service that works on it.
///
/// Watchers feed the orchestrator, the orchestrator drives the scan engine,
/// and thumbnails and pattern runs read what the scans wrote. All of it is
/// created once by [`CardSyncBuilder`] and shared from here.
pub struct CardSync {
    data_dir: PathBuf,
    index: Arc<CardIndex>,
    events: EventBus,
    orchestrator: SyncOrchestrator,
    thumbnails: Arc<ThumbnailQueue>,
    patterns: PatternRunner,
    watch: Mutex<WatchService>,
    settings: RwLock<SyncSettings>,
    sequencer: RequestSequencer,
}

impl CardSync {
    /// Create a builder for CardSync.
    ///
    /// ```rust,ignore
    /// let sync = CardSync::builder("./data")
    ///     .auto_create_dirs(true)
    ///     .with_settings_provider(Arc::new(JsonSettingsProvider::new("./settings.json")))
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder(data_dir: impl Into<PathBuf>) -> CardSyncBuilder {
        CardSyncBuilder::new(data_dir)
    }

    /// Create an instance with default settings, creating `data_dir` if needed.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(data_dir).auto_create_dirs(true).build().await
    }

    /// Directory holding the index database and thumbnails.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index(&self) -> &Arc<CardIndex> {
        &self.index
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn thumbnails(&self) -> &Arc<ThumbnailQueue> {
        &self.thumbnails
    }

    pub fn patterns(&self) -> &PatternRunner {
        &self.patterns
    }

    /// Current index revision.
    pub fn revision(&self) -> u64 {
        self.orchestrator.revision()
    }

    /// "Take latest" tickets for callers issuing overlapping queries.
    pub fn sequencer(&self) -> &RequestSequencer {
        &self.sequencer
    }

    /// Settings currently in effect.
    pub fn settings(&self) -> SyncSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stop all watchers and checkpoint the database.
    pub fn shutdown(&self) -> Result<()> {
        self.lock_watch().stop_all();
        self.index.checkpoint_wal()
    }

    fn lock_watch(&self) -> MutexGuard<'_, WatchService> {
        self.watch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
