//! Builder for configuring CardSync initialization.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

use crate::config::{IndexConfig, SettingsProvider, SyncSettings, ThumbnailConfig};
use crate::error::{CardSyncError, Result};
use crate::events::EventBus;
use crate::index::CardIndex;
use crate::pattern::PatternRunner;
use crate::scan::ScanEngine;
use crate::sync::{RequestSequencer, SyncOrchestrator};
use crate::thumbnail::{ImageThumbnailGenerator, ThumbnailGenerator, ThumbnailQueue};
use crate::watch::WatchService;
use crate::CardSync;

/// Builder for configuring CardSync initialization.
///
/// # Example
///
/// ```rust,ignore
/// use cardsync_core::CardSync;
///
/// let sync = CardSync::builder("./data")
///     .auto_create_dirs(true)
///     .start_watchers(false)
///     .build()
///     .await?;
/// ```
pub struct CardSyncBuilder {
    data_dir: PathBuf,
    auto_create_dirs: bool,
    start_watchers: bool,
    settings: Option<Arc<dyn SettingsProvider>>,
    generator: Option<Arc<dyn ThumbnailGenerator>>,
    event_capacity: usize,
}

impl CardSyncBuilder {
    /// Create a new builder with the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            auto_create_dirs: false,
            start_watchers: true,
            settings: None,
            generator: None,
            event_capacity: EventBus::DEFAULT_CAPACITY,
        }
    }

    /// Create the data directory if it does not exist.
    ///
    /// Default: `false` (the directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Start watchers for the configured roots during `build`.
    ///
    /// Default: `true`
    pub fn start_watchers(mut self, enable: bool) -> Self {
        self.start_watchers = enable;
        self
    }

    /// Where library roots and tuning come from. Without one, defaults with
    /// no libraries are used.
    pub fn with_settings_provider(mut self, provider: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(provider);
        self
    }

    /// Replace the JPEG thumbnail generator.
    pub fn with_thumbnail_generator(mut self, generator: Arc<dyn ThumbnailGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Buffered events per subscriber before the oldest are dropped.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    fn prepare_data_dir(&self) -> Result<()> {
        if self.data_dir.is_dir() {
            return Ok(());
        }
        if !self.auto_create_dirs {
            return Err(CardSyncError::Config {
                message: format!("Data directory does not exist: {}", self.data_dir.display()),
            });
        }
        std::fs::create_dir_all(&self.data_dir).map_err(|e| CardSyncError::Io {
            message: format!("Failed to create data directory: {}", self.data_dir.display()),
            path: Some(self.data_dir.clone()),
            source: Some(e),
        })
    }

    /// Build the CardSync instance. Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<CardSync> {
        self.prepare_data_dir()?;

        let settings = match &self.settings {
            Some(provider) => provider.load()?,
            None => SyncSettings::default(),
        };
        settings.validate()?;

        let index = Arc::new(CardIndex::new(self.data_dir.join(IndexConfig::DB_FILENAME))?);
        let events = EventBus::new(self.event_capacity);

        let generator = self.generator.clone().unwrap_or_else(|| {
            Arc::new(ImageThumbnailGenerator::new(
                settings.thumbnail_max_edge,
                ThumbnailConfig::JPEG_QUALITY,
            ))
        });
        let thumbnails = Arc::new(
            ThumbnailQueue::new(
                index.clone(),
                self.data_dir.join(IndexConfig::THUMBNAIL_DIR_NAME),
            )?
            .with_generator(generator)
            .with_concurrency(settings.thumbnail_concurrency)
            .with_events(events.clone()),
        );

        let scanner = ScanEngine::new(index.clone())
            .with_batch_size(settings.scan_batch_size)
            .with_concurrency(settings.scan_concurrency)
            .with_thumbnails(thumbnails.clone());
        let orchestrator = SyncOrchestrator::new(Arc::new(scanner), events.clone());
        let patterns = PatternRunner::new(index.clone()).with_events(events.clone());
        let watch = WatchService::new(Arc::new(orchestrator.clone()));

        let sync = CardSync {
            data_dir: self.data_dir,
            index,
            events,
            orchestrator,
            thumbnails,
            patterns,
            watch: Mutex::new(watch),
            settings: RwLock::new(settings.clone()),
            sequencer: RequestSequencer::new(),
        };

        if self.start_watchers {
            let diff = sync.apply_settings(settings)?;
            info!(
                "cardsync ready: {} watchers started, {} failed",
                diff.started.len(),
                diff.failed.len()
            );
        } else {
            sync.orchestrator
                .set_thumbnail_sweep(settings.thumbnails_after_scan.then(|| sync.thumbnails.clone()));
            info!("cardsync ready at {}", sync.data_dir.display());
        }

        Ok(sync)
    }
}
