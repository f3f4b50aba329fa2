//! Which filesystem events should lead to a rescan.

use crate::error::{CardSyncError, Result};
use crate::scan::{is_card_file, ScanMode};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::EventKind;
use std::path::{Path, PathBuf};

use super::{RelevancePredicate, WatchTarget};

/// Compiled relevance rules for one target.
pub struct RelevanceFilter {
    roots: Vec<PathBuf>,
    globs: Option<GlobSet>,
    max_depth: Option<usize>,
    mode: ScanMode,
    predicate: Option<RelevancePredicate>,
}

impl RelevanceFilter {
    pub fn new(target: &WatchTarget) -> Result<Self> {
        let globs = if target.include_globs.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &target.include_globs {
                let glob = Glob::new(pattern).map_err(|e| CardSyncError::Config {
                    message: format!("invalid glob '{}' for target {}: {}", pattern, target.id, e),
                })?;
                builder.add(glob);
            }
            Some(builder.build().map_err(|e| CardSyncError::Config {
                message: format!("invalid globs for target {}: {}", target.id, e),
            })?)
        };

        Ok(Self {
            roots: target.roots.clone(),
            globs,
            max_depth: target.max_depth,
            mode: target.mode,
            predicate: target.relevance.clone(),
        })
    }

    /// The root a relevant event falls under, or `None` to ignore it.
    pub fn relevant_root(&self, kind: &EventKind, path: &Path) -> Option<PathBuf> {
        if !matches!(
            kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return None;
        }

        let root = self.roots.iter().find(|root| path.starts_with(root))?;
        if let Some(max_depth) = self.max_depth {
            let depth = path.strip_prefix(root).ok()?.components().count();
            if depth > max_depth {
                return None;
            }
        }

        let relevant = if is_card_file(path) {
            self.globs.as_ref().map_or(true, |globs| globs.is_match(path))
        } else {
            self.mode == ScanMode::PlainFolder && is_directory_event(kind, path)
        };

        if relevant && self.predicate.as_ref().map_or(true, |accept| accept(path)) {
            Some(root.clone())
        } else {
            None
        }
    }
}

/// A directory that exists, or a removed path that looked like one.
fn is_directory_event(kind: &EventKind, path: &Path) -> bool {
    if path.is_dir() {
        return true;
    }
    matches!(kind, EventKind::Remove(_)) && path.extension().is_none()
}
