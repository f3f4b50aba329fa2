//! Library scanning.
//!
//! [`ScanEngine`] walks a library root, works out which card files changed
//! since the last pass, resolves each one to a card by content hash and
//! reconciles the index in short batch transactions.

mod engine;
mod progress;

pub use engine::ScanEngine;
pub use progress::ProgressThrottle;

use crate::config::ScanConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Who asked for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanOrigin {
    Manual,
    Filesystem,
    Import,
    Startup,
}

impl std::fmt::Display for ScanOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScanOrigin::Manual => "manual",
            ScanOrigin::Filesystem => "filesystem",
            ScanOrigin::Import => "import",
            ScanOrigin::Startup => "startup",
        };
        f.write_str(name)
    }
}

/// How a library's roots are laid out.
///
/// Only `PlainFolder` libraries react to directory-level filesystem events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    #[default]
    PlainFolder,
    MultiRoot,
}

/// Counters for one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub total_files: usize,
    /// Files read successfully, unchanged or indexed; `total_files` minus
    /// `failed_files`.
    pub processed_files: usize,
    pub skipped_unchanged: usize,
    pub failed_files: usize,
    pub added_cards: usize,
    pub updated_cards: usize,
    pub removed_cards: usize,
    pub added_files: usize,
    pub removed_files: usize,
}

impl ScanResult {
    /// Whether the pass changed anything in the index.
    pub fn has_changes(&self) -> bool {
        self.added_cards + self.updated_cards + self.removed_cards + self.added_files
            + self.removed_files
            > 0
    }
}

/// Receives scan progress. Both callbacks default to no-ops.
pub trait ScanObserver: Send + Sync {
    fn on_start(&self, _total: usize) {}
    fn on_progress(&self, _processed: usize, _total: usize) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Whether `path` has the managed card extension.
pub fn is_card_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ScanConfig::CARD_EXTENSION))
}
