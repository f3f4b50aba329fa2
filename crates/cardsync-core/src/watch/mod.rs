//! Filesystem watching.
//!
//! Each [`WatchTarget`] gets one native watcher. Relevant events re-arm a
//! debounce deadline; when it fires, one scan is requested per touched root.

mod relevance;
mod service;

pub use relevance::RelevanceFilter;
pub use service::{WatchDiff, WatchService};

use crate::config::WatchConfig;
use crate::scan::{ScanMode, ScanOrigin};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Receives debounced rescan requests.
pub trait ScanRequester: Send + Sync + 'static {
    fn request_scan(&self, origin: ScanOrigin, root: PathBuf, library_id: String, mode: ScanMode);
}

/// Extra relevance check applied after the built-in rules.
pub type RelevancePredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// One logical thing to watch.
#[derive(Clone)]
pub struct WatchTarget {
    pub id: String,
    pub roots: Vec<PathBuf>,
    /// Absolute-path globs a card file must match; empty admits all.
    pub include_globs: Vec<String>,
    pub library_id: String,
    pub mode: ScanMode,
    /// Deepest relevant path, counted in components below the root.
    pub max_depth: Option<usize>,
    pub relevance: Option<RelevancePredicate>,
    pub debounce: Duration,
}

impl WatchTarget {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>, library_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roots: vec![root.into()],
            include_globs: Vec::new(),
            library_id: library_id.into(),
            mode: ScanMode::PlainFolder,
            max_depth: None,
            relevance: None,
            debounce: WatchConfig::DEBOUNCE,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_globs(mut self, globs: Vec<String>) -> Self {
        self.include_globs = globs;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_relevance(mut self, predicate: RelevancePredicate) -> Self {
        self.relevance = Some(predicate);
        self
    }

    /// Structural identity used to decide whether a running watcher can stay.
    /// The predicate is not comparable and is left out.
    pub fn key(&self) -> WatchKey {
        WatchKey {
            roots: self.roots.clone(),
            include_globs: self.include_globs.clone(),
            library_id: self.library_id.clone(),
            mode: self.mode,
            max_depth: self.max_depth,
            debounce: self.debounce,
        }
    }
}

impl fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchTarget")
            .field("id", &self.id)
            .field("roots", &self.roots)
            .field("include_globs", &self.include_globs)
            .field("library_id", &self.library_id)
            .field("mode", &self.mode)
            .field("max_depth", &self.max_depth)
            .field("relevance", &self.relevance.is_some())
            .field("debounce", &self.debounce)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub roots: Vec<PathBuf>,
    pub include_globs: Vec<String>,
    pub library_id: String,
    pub mode: ScanMode,
    pub max_depth: Option<usize>,
    pub debounce: Duration,
}
