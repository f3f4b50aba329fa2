//! Centralized configuration for cardsync.
//!
//! Tuning constants live on zero-sized config structs. User-facing settings
//! (library roots, watch options, overrides) are a serde document read
//! through a [`SettingsProvider`].

use crate::error::{CardSyncError, Result};
use crate::metadata::{atomic_read_json, atomic_write_json};
use crate::scan::ScanMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Index storage configuration.
pub struct IndexConfig;

impl IndexConfig {
    pub const DB_FILENAME: &'static str = "cards.db";
    pub const BUSY_TIMEOUT_MS: u32 = 30_000;
    pub const THUMBNAIL_DIR_NAME: &'static str = "thumbnails";
}

/// Scan engine defaults.
pub struct ScanConfig;

impl ScanConfig {
    /// Files committed per transaction.
    pub const BATCH_SIZE: usize = 200;
    /// Concurrent stat/parse/hash jobs within a batch.
    pub const PREPARE_CONCURRENCY: usize = 5;
    /// Minimum spacing between progress callbacks.
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
    /// Managed card file extension (matched case-insensitively).
    pub const CARD_EXTENSION: &'static str = "png";
}

/// Filesystem watch defaults.
pub struct WatchConfig;

impl WatchConfig {
    pub const DEBOUNCE: Duration = Duration::from_secs(2);
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
}

/// Thumbnail queue defaults.
pub struct ThumbnailConfig;

impl ThumbnailConfig {
    pub const CONCURRENCY: usize = 4;
    pub const MAX_EDGE: u32 = 512;
    pub const JPEG_QUALITY: u8 = 82;
    pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const EXTENSION: &'static str = "jpg";
}

/// Pattern runner defaults.
pub struct PatternConfig;

impl PatternConfig {
    /// Cards processed between cooperative yields.
    pub const YIELD_EVERY: usize = 64;
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
    /// Upper bound on compiled regex size.
    pub const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);
}

/// One configured library root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRootSettings {
    pub path: PathBuf,
    /// Disable filesystem watching for this root (manual scans still work).
    #[serde(default = "default_true")]
    pub watch: bool,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    /// Optional include globs, matched against absolute paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_globs: Vec<String>,
}

impl LibraryRootSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watch: true,
            mode: ScanMode::default(),
            max_depth: None,
            include_globs: Vec::new(),
        }
    }
}

/// User-facing settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default)]
    pub libraries: Vec<LibraryRootSettings>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_batch_size")]
    pub scan_batch_size: usize,
    #[serde(default = "default_prepare_concurrency")]
    pub scan_concurrency: usize,
    #[serde(default = "default_thumbnail_concurrency")]
    pub thumbnail_concurrency: usize,
    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_max_edge: u32,
    #[serde(default = "default_thumbnail_timeout_ms")]
    pub thumbnail_timeout_ms: u64,
    /// Run the missing-thumbnail sweep after every completed scan.
    #[serde(default)]
    pub thumbnails_after_scan: bool,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    WatchConfig::DEBOUNCE.as_millis() as u64
}

fn default_batch_size() -> usize {
    ScanConfig::BATCH_SIZE
}

fn default_prepare_concurrency() -> usize {
    ScanConfig::PREPARE_CONCURRENCY
}

fn default_thumbnail_concurrency() -> usize {
    ThumbnailConfig::CONCURRENCY
}

fn default_thumbnail_edge() -> u32 {
    ThumbnailConfig::MAX_EDGE
}

fn default_thumbnail_timeout_ms() -> u64 {
    ThumbnailConfig::WAIT_TIMEOUT.as_millis() as u64
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            libraries: Vec::new(),
            debounce_ms: default_debounce_ms(),
            scan_batch_size: default_batch_size(),
            scan_concurrency: default_prepare_concurrency(),
            thumbnail_concurrency: default_thumbnail_concurrency(),
            thumbnail_max_edge: default_thumbnail_edge(),
            thumbnail_timeout_ms: default_thumbnail_timeout_ms(),
            thumbnails_after_scan: false,
        }
    }
}

impl SyncSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_millis(self.thumbnail_timeout_ms)
    }

    /// Reject settings that cannot drive a scan.
    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(CardSyncError::Config {
                message: "scanBatchSize must be at least 1".to_string(),
            });
        }
        if self.scan_concurrency == 0 || self.thumbnail_concurrency == 0 {
            return Err(CardSyncError::Config {
                message: "concurrency limits must be at least 1".to_string(),
            });
        }
        for root in &self.libraries {
            if root.path.as_os_str().is_empty() {
                return Err(CardSyncError::Config {
                    message: "library root path is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Source of the configured library roots and tuning.
pub trait SettingsProvider: Send + Sync {
    /// Read the current settings.
    fn load(&self) -> Result<SyncSettings>;
}

/// Settings stored as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonSettingsProvider {
    path: PathBuf,
}

impl JsonSettingsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist settings atomically.
    pub fn save(&self, settings: &SyncSettings) -> Result<()> {
        settings.validate()?;
        atomic_write_json(&self.path, settings, true)
    }
}

impl SettingsProvider for JsonSettingsProvider {
    fn load(&self) -> Result<SyncSettings> {
        let settings: SyncSettings = atomic_read_json(&self.path)?.unwrap_or_default();
        settings.validate()?;
        Ok(settings)
    }
}

/// Fixed in-memory settings, mostly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsProvider(pub SyncSettings);

impl SettingsProvider for StaticSettingsProvider {
    fn load(&self) -> Result<SyncSettings> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}
