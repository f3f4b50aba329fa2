//! Library, scan and settings methods on CardSync.

use std::path::Path;
use tracing::{info, warn};

use crate::config::{SettingsProvider, SyncSettings};
use crate::error::{CardSyncError, Result};
use crate::index::{LibraryRecord, LibraryStats};
use crate::scan::{ScanMode, ScanOrigin, ScanResult};
use crate::watch::{WatchDiff, WatchTarget};
use crate::CardSync;

impl CardSync {
    // ========================================
    // Libraries
    // ========================================

    /// Register `root` as a library (idempotent). The root must exist.
    pub fn register_library(&self, root: &Path) -> Result<LibraryRecord> {
        ensure_root_exists(root)?;
        self.index.ensure_library(root)
    }

    pub fn list_libraries(&self) -> Result<Vec<LibraryRecord>> {
        self.index.list_libraries()
    }

    pub fn library_stats(&self, library_id: &str) -> Result<LibraryStats> {
        self.index.stats(library_id)
    }

    // ========================================
    // Scans
    // ========================================

    /// Queue a pass over `root` and return its library id without waiting.
    pub fn request_scan(&self, origin: ScanOrigin, root: &Path, mode: ScanMode) -> Result<String> {
        let library = self.register_library(root)?;
        self.orchestrator
            .request_scan(origin, library.root_path, library.id.clone(), mode);
        Ok(library.id)
    }

    /// Run a pass over `root` now and return its counts.
    pub async fn scan_now(&self, origin: ScanOrigin, root: &Path) -> Result<ScanResult> {
        let library = self.register_library(root)?;
        self.orchestrator
            .scan_now(origin, library.root_path, library.id, ScanMode::PlainFolder)
            .await
    }

    /// Queue a pass for every configured root that exists.
    pub fn request_configured_scans(&self, origin: ScanOrigin) -> Vec<String> {
        let settings = self.settings();
        let mut requested = Vec::new();
        for root in &settings.libraries {
            match self.request_scan(origin, &root.path, root.mode) {
                Ok(library_id) => requested.push(library_id),
                Err(e) => warn!("Skipping scan of {}: {}", root.path.display(), e),
            }
        }
        requested
    }

    /// Resolve once `library_id` has no pass running or queued.
    pub async fn wait_idle(&self, library_id: &str) {
        self.orchestrator.wait_idle(library_id).await;
    }

    // ========================================
    // Settings and watchers
    // ========================================

    /// Make `settings` current and converge the watchers on its roots.
    ///
    /// Roots that do not exist are reported in [`WatchDiff::failed`] and
    /// skipped. Scan and thumbnail tuning is fixed when the instance is built.
    pub fn apply_settings(&self, settings: SyncSettings) -> Result<WatchDiff> {
        settings.validate()?;

        let mut targets = Vec::new();
        let mut missing = Vec::new();
        for root in &settings.libraries {
            if let Err(e) = ensure_root_exists(&root.path) {
                warn!("Library root unavailable: {}", e);
                missing.push((root.path.display().to_string(), e.to_string()));
                continue;
            }
            let library = self.index.ensure_library(&root.path)?;
            if !root.watch {
                continue;
            }
            targets.push(
                WatchTarget::new(library.id.clone(), library.root_path, library.id)
                    .with_mode(root.mode)
                    .with_globs(root.include_globs.clone())
                    .with_max_depth(root.max_depth)
                    .with_debounce(settings.debounce()),
            );
        }

        let mut diff = self.lock_watch().sync_targets(targets);
        diff.failed.extend(missing);

        self.orchestrator.set_thumbnail_sweep(
            settings
                .thumbnails_after_scan
                .then(|| self.thumbnails.clone()),
        );
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;

        info!(
            "Applied settings: {} started, {} restarted, {} stopped, {} unchanged, {} failed",
            diff.started.len(),
            diff.restarted.len(),
            diff.stopped.len(),
            diff.unchanged.len(),
            diff.failed.len()
        );
        Ok(diff)
    }

    /// Re-read settings from `provider` and apply them.
    pub fn reload_settings(&self, provider: &dyn SettingsProvider) -> Result<WatchDiff> {
        self.apply_settings(provider.load()?)
    }

    /// Ids of targets with a live watcher.
    pub fn watched_targets(&self) -> Vec<String> {
        self.lock_watch().active_targets()
    }
}

fn ensure_root_exists(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else if root.exists() {
        Err(CardSyncError::NotADirectory(root.to_path_buf()))
    } else {
        Err(CardSyncError::Config {
            message: format!("library root {} does not exist", root.display()),
        })
    }
}
