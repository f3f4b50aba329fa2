//! Scan pass: enumerate, prepare, commit in batches, reconcile deletions.

use crate::config::ScanConfig;
use crate::error::{is_unique_violation_on, CardSyncError, Result};
use crate::identity::content_hash;
use crate::index::writes::{self, CARD_HASH_UNIQUE_COLUMNS};
use crate::index::{canonical_root, CardIndex, FileStamp, KnownFile};
use crate::parser::{parse_card_file, ParsedCard};
use crate::sync::LibraryScanner;
use crate::thumbnail::ThumbnailQueue;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::progress::ProgressThrottle;
use super::{is_card_file, ScanObserver, ScanResult};

/// Result of stat/parse/hash for one file, computed outside any transaction.
enum Prepared {
    Unchanged,
    Changed(ChangedFile),
    Failed(String),
}

struct ChangedFile {
    path: PathBuf,
    stamp: FileStamp,
    card: ParsedCard,
    hash: String,
    /// Card the path pointed at before this pass.
    known_card: Option<String>,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    added_cards: usize,
    updated_cards: usize,
    added_files: usize,
    /// Cards rewritten in place; their thumbnails are stale.
    updated_ids: Vec<String>,
}

/// Synchronizes one library root with the index.
pub struct ScanEngine {
    index: Arc<CardIndex>,
    batch_size: usize,
    concurrency: usize,
    thumbnails: Option<Arc<ThumbnailQueue>>,
}

impl ScanEngine {
    pub fn new(index: Arc<CardIndex>) -> Self {
        Self {
            index,
            batch_size: ScanConfig::BATCH_SIZE,
            concurrency: ScanConfig::PREPARE_CONCURRENCY,
            thumbnails: None,
        }
    }

    /// Files committed per transaction.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Files prepared concurrently.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Remove thumbnails of cards deleted by reconciliation and invalidate
    /// those of cards rewritten in place.
    pub fn with_thumbnails(mut self, thumbnails: Arc<ThumbnailQueue>) -> Self {
        self.thumbnails = Some(thumbnails);
        self
    }

    /// Run one full pass over `root` for `library_id`.
    pub async fn scan_folder(
        &self,
        root: &Path,
        library_id: &str,
        observer: &dyn ScanObserver,
    ) -> Result<ScanResult> {
        let started = Instant::now();
        let root = check_root(root).await?;
        if self.index.get_library(library_id)?.is_none() {
            return Err(CardSyncError::LibraryNotFound {
                library_id: library_id.to_string(),
            });
        }

        let files = enumerate_card_files(root.clone()).await?;
        let total = files.len();
        observer.on_start(total);
        info!(
            "Scanning {} ({} card files) for library {}",
            root.display(),
            total,
            library_id
        );

        // Other roots of a multi-root library are not ours to reconcile.
        let mut known = self.index.known_files(library_id)?;
        known.retain(|path, _| path.starts_with(&root));

        let mut result = ScanResult {
            total_files: total,
            ..Default::default()
        };
        let mut observed: HashSet<PathBuf> = HashSet::with_capacity(total);
        let mut throttle = ProgressThrottle::new(ScanConfig::PROGRESS_INTERVAL);
        let mut processed = 0;
        let mut updated_ids: Vec<String> = Vec::new();

        for chunk in files.chunks(self.batch_size) {
            let prepared: Vec<(PathBuf, Prepared)> = stream::iter(chunk.iter().cloned())
                .map(|path| {
                    let known_file = known.get(&path).cloned();
                    async move {
                        let outcome = prepare_file(path.clone(), known_file).await;
                        (path, outcome)
                    }
                })
                .buffered(self.concurrency)
                .collect()
                .await;

            let mut changed = Vec::new();
            for (path, outcome) in prepared {
                match outcome {
                    Prepared::Unchanged => {
                        result.skipped_unchanged += 1;
                        result.processed_files += 1;
                        observed.insert(path);
                    }
                    Prepared::Changed(file) => {
                        result.processed_files += 1;
                        observed.insert(path);
                        changed.push(file);
                    }
                    Prepared::Failed(reason) => {
                        warn!("Skipping {}: {}", path.display(), reason);
                        result.failed_files += 1;
                    }
                }
            }

            if !changed.is_empty() {
                let now = Utc::now().to_rfc3339();
                let outcome = self
                    .index
                    .write(|tx| commit_batch(tx, library_id, &changed, &now))?;
                result.added_cards += outcome.added_cards;
                result.updated_cards += outcome.updated_cards;
                result.added_files += outcome.added_files;
                updated_ids.extend(outcome.updated_ids);
            }

            // Progress counts attempted files; `processed_files` only successes.
            processed += chunk.len();
            if throttle.tick(processed, total) {
                observer.on_progress(processed, total);
            }
        }

        if throttle.tick(total, total) {
            observer.on_progress(total, total);
        }

        let missing: Vec<PathBuf> = known
            .keys()
            .filter(|path| !observed.contains(*path))
            .cloned()
            .collect();
        let removed_ids = self.reconcile(library_id, &missing)?;
        result.removed_files = missing.len();
        result.removed_cards = removed_ids.len();

        if let Some(thumbnails) = &self.thumbnails {
            for card_id in &removed_ids {
                if let Err(e) = thumbnails.remove(card_id).await {
                    warn!("Failed to remove thumbnail for card {}: {}", card_id, e);
                }
            }
            for card_id in updated_ids.iter().filter(|id| !removed_ids.contains(id)) {
                if let Err(e) = thumbnails.invalidate(card_id).await {
                    warn!("Failed to invalidate thumbnail for card {}: {}", card_id, e);
                }
            }
        }

        self.index.mark_scanned(library_id)?;
        info!(
            "Scan of {} finished in {:?}: +{} cards, ~{} updated, -{} cards, {} unchanged, {} failed",
            root.display(),
            started.elapsed(),
            result.added_cards,
            result.updated_cards,
            result.removed_cards,
            result.skipped_unchanged,
            result.failed_files
        );
        Ok(result)
    }

    /// Drop unobserved files, then every card left without a file.
    fn reconcile(&self, library_id: &str, missing: &[PathBuf]) -> Result<Vec<String>> {
        self.index.write(|tx| {
            if !missing.is_empty() {
                let touched = writes::remove_card_files(tx, library_id, missing)?;
                debug!(
                    "Removed {} stale files touching {} cards",
                    missing.len(),
                    touched.len()
                );
            }
            let removed = writes::remove_cards_without_files(tx, library_id)?;
            writes::clear_dangling_primary(tx, library_id)?;
            writes::remove_unused_tags(tx)?;
            Ok(removed)
        })
    }
}

#[async_trait]
impl LibraryScanner for ScanEngine {
    async fn scan(
        &self,
        root: &Path,
        library_id: &str,
        observer: &dyn ScanObserver,
    ) -> Result<ScanResult> {
        self.scan_folder(root, library_id, observer).await
    }
}

async fn check_root(root: &Path) -> Result<PathBuf> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(canonical_root(root)),
        Ok(_) => Err(CardSyncError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CardSyncError::Config {
            message: format!("library root {} does not exist", root.display()),
        }),
        Err(e) => Err(CardSyncError::io_with_path(e, root)),
    }
}

/// Every card file under `root`, sorted. Any walk error aborts.
async fn enumerate_card_files(root: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| CardSyncError::Enumeration {
                root: root.clone(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file() && is_card_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    })
    .await?
}

async fn prepare_file(path: PathBuf, known: Option<KnownFile>) -> Prepared {
    let job = tokio::task::spawn_blocking(move || {
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => return Prepared::Failed(format!("stat failed: {e}")),
        };
        let stamp = FileStamp::from_metadata(&meta);

        if let Some(known) = &known {
            if known.stamp == stamp && known.derived_ready {
                return Prepared::Unchanged;
            }
        }

        let card = match parse_card_file(&path) {
            Ok(card) => card,
            Err(e) => return Prepared::Failed(e.to_string()),
        };
        let hash = content_hash(&card.raw);

        Prepared::Changed(ChangedFile {
            path,
            stamp,
            card,
            hash,
            known_card: known.map(|k| k.card_id),
        })
    });

    match job.await {
        Ok(prepared) => prepared,
        Err(e) => Prepared::Failed(format!("preparation task failed: {e}")),
    }
}

/// Resolve and write one batch of changed files.
fn commit_batch(
    conn: &Connection,
    library_id: &str,
    files: &[ChangedFile],
    now: &str,
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    // Cards whose tag links were already rebuilt in this batch.
    let mut tagged: HashSet<String> = HashSet::new();

    for file in files {
        let card_id = match resolve_in_place(conn, library_id, file)? {
            Some(card_id) => {
                writes::update_card(conn, &card_id, &file.hash, &file.card, now)?;
                outcome.updated_cards += 1;
                outcome.updated_ids.push(card_id.clone());
                debug!("Updated card {} from {}", card_id, file.path.display());
                card_id
            }
            None => match writes::find_card_by_hash(conn, library_id, &file.hash)? {
                Some(existing) => {
                    debug!("{} duplicates card {}", file.path.display(), existing);
                    existing
                }
                None => {
                    let (card_id, created) = insert_or_attach(conn, library_id, file, now)?;
                    if created {
                        outcome.added_cards += 1;
                    }
                    card_id
                }
            },
        };

        writes::upsert_card_file(conn, &card_id, library_id, &file.path, &file.stamp, now)?;
        writes::set_primary_if_unset(conn, &card_id, &file.path)?;
        if file.known_card.is_none() {
            outcome.added_files += 1;
        }

        if tagged.insert(card_id.clone()) {
            writes::replace_card_tags(conn, &card_id, &file.card.tags)?;
        }
    }

    Ok(outcome)
}

/// The card to rewrite in place, when the path already belongs to a card
/// that nothing else shares and no other card owns the new hash.
fn resolve_in_place(
    conn: &Connection,
    library_id: &str,
    file: &ChangedFile,
) -> Result<Option<String>> {
    let Some(card_id) = &file.known_card else {
        return Ok(None);
    };
    if writes::other_file_count(conn, card_id, &file.path)? > 0 {
        return Ok(None);
    }
    match writes::find_card_by_hash(conn, library_id, &file.hash)? {
        Some(owner) if &owner != card_id => Ok(None),
        _ => Ok(Some(card_id.clone())),
    }
}

/// Insert a new card, or attach to the card that won a concurrent insert of
/// the same hash. Returns the card id and whether it was created.
fn insert_or_attach(
    conn: &Connection,
    library_id: &str,
    file: &ChangedFile,
    now: &str,
) -> Result<(String, bool)> {
    let card_id = Uuid::new_v4().to_string();
    match writes::insert_card(
        conn,
        &card_id,
        library_id,
        &file.hash,
        &file.card,
        &file.path,
        now,
    ) {
        Ok(()) => {
            debug!("Created card {} from {}", card_id, file.path.display());
            Ok((card_id, true))
        }
        Err(e) if is_unique_violation_on(&e, CARD_HASH_UNIQUE_COLUMNS) => {
            let existing = writes::find_card_by_hash(conn, library_id, &file.hash)?
                .ok_or_else(|| CardSyncError::Database {
                    message: format!(
                        "card with hash {} vanished after a uniqueness conflict",
                        file.hash
                    ),
                    source: Some(e),
                })?;
            debug!(
                "Lost insert race for {}; attaching to card {}",
                file.path.display(),
                existing
            );
            Ok((existing, false))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::{card_image_png_filled, card_png, plain_png};
    use crate::parser::parse_card_bytes;
    use crate::scan::NoopObserver;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Setup {
        _temp: TempDir,
        root: PathBuf,
        index: Arc<CardIndex>,
        library_id: String,
    }

    fn setup() -> Setup {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("library");
        std::fs::create_dir_all(&root).unwrap();
        let index = Arc::new(CardIndex::new(temp.path().join("cards.db")).unwrap());
        let library_id = index.ensure_library(&root).unwrap().id;
        let root = canonical_root(&root);
        Setup {
            _temp: temp,
            root,
            index,
            library_id,
        }
    }

    fn v2(name: &str, description: &str) -> Value {
        json!({"spec": "chara_card_v2", "spec_version": "2.0", "data": {
            "name": name, "description": description, "tags": ["test"]
        }})
    }

    fn write_card(dir: &Path, file: &str, payload: &Value) -> PathBuf {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, card_png(payload)).unwrap();
        path
    }

    #[derive(Default)]
    struct Recorder {
        starts: Mutex<Vec<usize>>,
        progress: Mutex<Vec<(usize, usize)>>,
    }

    impl ScanObserver for Recorder {
        fn on_start(&self, total: usize) {
            self.starts.lock().unwrap().push(total);
        }
        fn on_progress(&self, processed: usize, total: usize) {
            self.progress.lock().unwrap().push((processed, total));
        }
    }

    #[tokio::test]
    async fn test_first_scan_indexes_cards() {
        let s = setup();
        write_card(&s.root, "a.png", &v2("Aria", "elf"));
        write_card(&s.root, "nested/b.PNG", &v2("Bram", "dwarf"));
        std::fs::write(s.root.join("notes.txt"), "ignored").unwrap();

        let engine = ScanEngine::new(s.index.clone());
        let recorder = Recorder::default();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &recorder)
            .await
            .unwrap();

        assert_eq!(result.total_files, 2);
        assert_eq!(result.processed_files, 2);
        assert_eq!(result.added_cards, 2);
        assert_eq!(result.added_files, 2);
        assert_eq!(*recorder.starts.lock().unwrap(), vec![2]);
        assert_eq!(recorder.progress.lock().unwrap().last(), Some(&(2, 2)));
        assert_eq!(s.index.stats(&s.library_id).unwrap().cards, 2);
    }

    #[tokio::test]
    async fn test_rescan_without_changes_skips_everything() {
        let s = setup();
        write_card(&s.root, "a.png", &v2("Aria", "elf"));
        let engine = ScanEngine::new(s.index.clone());
        engine.scan_folder(&s.root, &s.library_id, &NoopObserver).await.unwrap();

        let second = engine
            .scan_folder(&s.root, &s.library_id, &NoopObserver)
            .await
            .unwrap();
        assert_eq!(second.skipped_unchanged, 1);
        assert!(!second.has_changes());
    }

    #[tokio::test]
    async fn test_duplicates_share_one_card() {
        let s = setup();
        let payload = v2("Aria", "elf");
        write_card(&s.root, "a.png", &payload);
        write_card(&s.root, "copy/a.png", &payload);

        let engine = ScanEngine::new(s.index.clone()).with_batch_size(1);
        let result = engine
            .scan_folder(&s.root, &s.library_id, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(result.added_cards, 1);
        assert_eq!(result.added_files, 2);
        let ids = s.index.card_ids(&s.library_id).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(s.index.card_files(&ids[0]).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_file_is_counted_and_removed() {
        let s = setup();
        let path = write_card(&s.root, "a.png", &v2("Aria", "elf"));
        let engine = ScanEngine::new(s.index.clone());
        engine.scan_folder(&s.root, &s.library_id, &NoopObserver).await.unwrap();

        std::fs::write(&path, plain_png()).unwrap();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(result.failed_files, 1);
        assert_eq!(result.processed_files, 0);
        assert_eq!(result.removed_files, 1);
        assert_eq!(result.removed_cards, 1);
        assert!(s.index.card_ids(&s.library_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_changed_content_updates_in_place() {
        let s = setup();
        let path = write_card(&s.root, "a.png", &v2("Aria", "elf"));
        let engine = ScanEngine::new(s.index.clone());
        engine.scan_folder(&s.root, &s.library_id, &NoopObserver).await.unwrap();
        let id = s.index.card_ids(&s.library_id).unwrap().remove(0);

        std::fs::write(&path, card_png(&v2("Aria", "a much longer description"))).unwrap();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(result.updated_cards, 1);
        assert_eq!(result.added_cards, 0);
        let card = s.index.get_card(&id).unwrap().unwrap();
        assert_eq!(card.description, "a much longer description");
    }

    #[tokio::test]
    async fn test_editing_one_duplicate_splits_it_off() {
        let s = setup();
        let payload = v2("Aria", "elf");
        write_card(&s.root, "a.png", &payload);
        let copy = write_card(&s.root, "b.png", &payload);
        let engine = ScanEngine::new(s.index.clone());
        engine.scan_folder(&s.root, &s.library_id, &NoopObserver).await.unwrap();
        let original = s.index.card_ids(&s.library_id).unwrap().remove(0);

        std::fs::write(&copy, card_png(&v2("Aria", "an edited elf card"))).unwrap();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(result.added_cards, 1);
        assert_eq!(result.updated_cards, 0);
        let original_card = s.index.get_card(&original).unwrap().unwrap();
        assert_eq!(original_card.description, "elf");
        assert_eq!(s.index.card_files(&original).unwrap().len(), 1);
        assert_eq!(s.index.card_ids(&s.library_id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_root_is_rejected() {
        let s = setup();
        let engine = ScanEngine::new(s.index.clone());
        let err = engine
            .scan_folder(&s.root.join("nope"), &s.library_id, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, CardSyncError::Config { .. }));
    }

    #[tokio::test]
    async fn test_unknown_library_is_rejected() {
        let s = setup();
        let engine = ScanEngine::new(s.index.clone());
        let err = engine
            .scan_folder(&s.root, "no-such-library", &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, CardSyncError::LibraryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_root_reports_completion() {
        let s = setup();
        let engine = ScanEngine::new(s.index.clone());
        let recorder = Recorder::default();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &recorder)
            .await
            .unwrap();
        assert_eq!(result, ScanResult::default());
        assert_eq!(*recorder.progress.lock().unwrap(), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_failed_files_are_not_processed() {
        let s = setup();
        write_card(&s.root, "a.png", &v2("Aria", "elf"));
        write_card(&s.root, "b.png", &v2("Bram", "dwarf"));
        std::fs::write(s.root.join("c.png"), b"not a png").unwrap();

        let engine = ScanEngine::new(s.index.clone());
        let recorder = Recorder::default();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &recorder)
            .await
            .unwrap();

        assert_eq!(result.total_files, 3);
        assert_eq!(result.processed_files, 2);
        assert_eq!(result.failed_files, 1);
        assert_eq!(recorder.progress.lock().unwrap().last(), Some(&(3, 3)));
    }

    #[tokio::test]
    async fn test_in_place_update_regenerates_thumbnail() {
        let s = setup();
        let thumbnails =
            Arc::new(ThumbnailQueue::new(s.index.clone(), s._temp.path().join("thumbs")).unwrap());
        let engine = ScanEngine::new(s.index.clone()).with_thumbnails(thumbnails.clone());

        let path = s.root.join("x.png");
        let red = image::Rgba([220, 30, 30, 255]);
        let green = image::Rgba([30, 220, 30, 255]);
        std::fs::write(&path, card_image_png_filled(&v2("Xan", "red"), 32, 32, red)).unwrap();
        engine.scan_folder(&s.root, &s.library_id, &NoopObserver).await.unwrap();
        let id = s.index.card_ids(&s.library_id).unwrap().remove(0);

        let thumb = thumbnails.ensure_thumbnail(&id).await.unwrap();
        let pixel = image::open(&thumb).unwrap().to_rgb8().get_pixel(0, 0).0;
        assert!(pixel[0] > pixel[1]);

        std::fs::write(
            &path,
            card_image_png_filled(&v2("Xan", "green all over now"), 32, 32, green),
        )
        .unwrap();
        let result = engine
            .scan_folder(&s.root, &s.library_id, &NoopObserver)
            .await
            .unwrap();
        assert_eq!(result.updated_cards, 1);
        assert!(!thumb.exists());
        assert_eq!(s.index.get_card(&id).unwrap().unwrap().thumbnail_path, None);

        let regenerated = thumbnails.ensure_thumbnail(&id).await.unwrap();
        assert_eq!(regenerated, thumb);
        let pixel = image::open(&regenerated).unwrap().to_rgb8().get_pixel(0, 0).0;
        assert!(pixel[1] > pixel[0]);
    }

    fn changed_file(path: PathBuf, payload: &Value) -> ChangedFile {
        let card = parse_card_bytes(&card_png(payload)).unwrap();
        ChangedFile {
            path,
            stamp: FileStamp {
                size: 1,
                mtime_ms: 1,
                birthtime_ms: 1,
            },
            hash: content_hash(&card.raw),
            card,
            known_card: None,
        }
    }

    #[test]
    fn test_hash_conflict_attaches_to_existing_card() {
        let s = setup();
        let now = Utc::now().to_rfc3339();
        let winner = changed_file(s.root.join("a.png"), &v2("Aria", "elf"));
        let loser = changed_file(s.root.join("b.png"), &v2("Aria", "elf"));

        let (card_id, created) = s
            .index
            .write(|tx| {
                writes::insert_card(
                    tx,
                    "existing",
                    &s.library_id,
                    &winner.hash,
                    &winner.card,
                    &winner.path,
                    &now,
                )?;
                // Skips the hash lookup, as a racing writer would.
                insert_or_attach(tx, &s.library_id, &loser, &now)
            })
            .unwrap();

        assert_eq!((card_id.as_str(), created), ("existing", false));
        assert_eq!(s.index.card_ids(&s.library_id).unwrap(), vec!["existing"]);
    }

    #[test]
    fn test_other_constraint_errors_propagate() {
        let s = setup();
        let now = Utc::now().to_rfc3339();
        let file = changed_file(s.root.join("a.png"), &v2("Aria", "elf"));

        // No such library: a foreign key failure, not a hash conflict.
        let err = s
            .index
            .write(|tx| insert_or_attach(tx, "no-such-library", &file, &now))
            .unwrap_err();

        assert!(matches!(err, CardSyncError::Database { .. }));
        assert!(!err.is_unique_violation_on(CARD_HASH_UNIQUE_COLUMNS));
        assert!(s.index.card_ids(&s.library_id).unwrap().is_empty());
    }
}
