//! Per-library scan coalescing and revision tracking.

use crate::error::Result;
use crate::events::{EventBus, SyncEvent};
use crate::scan::{ScanMode, ScanObserver, ScanOrigin, ScanResult};
use crate::thumbnail::ThumbnailQueue;
use crate::watch::ScanRequester;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Runs one scan pass. Implemented by [`ScanEngine`](crate::scan::ScanEngine).
#[async_trait]
pub trait LibraryScanner: Send + Sync + 'static {
    async fn scan(
        &self,
        root: &Path,
        library_id: &str,
        observer: &dyn ScanObserver,
    ) -> Result<ScanResult>;
}

#[derive(Debug, Clone)]
struct PendingScan {
    origin: ScanOrigin,
    root: PathBuf,
    mode: ScanMode,
}

/// Roots requested while a pass was running. Later requests replace the
/// origin and mode; every distinct root is kept, nested roots collapse into
/// their ancestor.
#[derive(Debug)]
struct FollowUp {
    origin: ScanOrigin,
    mode: ScanMode,
    roots: BTreeSet<PathBuf>,
}

impl FollowUp {
    fn new(pending: PendingScan) -> Self {
        Self {
            origin: pending.origin,
            mode: pending.mode,
            roots: BTreeSet::from([pending.root]),
        }
    }

    fn merge(&mut self, pending: PendingScan) {
        self.origin = pending.origin;
        self.mode = pending.mode;
        if self.roots.iter().any(|root| pending.root.starts_with(root)) {
            return;
        }
        self.roots.retain(|root| !root.starts_with(&pending.root));
        self.roots.insert(pending.root);
    }

    fn into_passes(self) -> impl Iterator<Item = PendingScan> {
        let Self {
            origin,
            mode,
            roots,
        } = self;
        roots
            .into_iter()
            .map(move |root| PendingScan { origin, root, mode })
    }
}

struct LibraryState {
    running: bool,
    queued: Option<FollowUp>,
    busy: watch::Sender<bool>,
    /// Held for the duration of every pass, queued or direct.
    pass_lock: Arc<tokio::sync::Mutex<()>>,
}

impl LibraryState {
    fn new() -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            running: false,
            queued: None,
            busy,
            pass_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

struct Inner {
    scanner: Arc<dyn LibraryScanner>,
    events: EventBus,
    revision: AtomicU64,
    libraries: Mutex<HashMap<String, LibraryState>>,
    thumbnail_sweep: Mutex<Option<Arc<ThumbnailQueue>>>,
}

/// The single entry point between scan triggers and the scanner.
///
/// Per library there is at most one pass in flight and at most one queued
/// follow-up; requests arriving mid-pass collapse into that follow-up, which
/// rescans each distinct root it collected.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(scanner: Arc<dyn LibraryScanner>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                scanner,
                events,
                revision: AtomicU64::new(0),
                libraries: Mutex::new(HashMap::new()),
                thumbnail_sweep: Mutex::new(None),
            }),
        }
    }

    /// Generate missing thumbnails after each pass that added or changed
    /// cards. `None` turns the sweep off.
    pub fn set_thumbnail_sweep(&self, thumbnails: Option<Arc<ThumbnailQueue>>) {
        *self
            .inner
            .thumbnail_sweep
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = thumbnails;
    }

    /// Revision of the index, bumped after every completed pass.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Queue a pass without waiting for it. Must be called inside a tokio runtime.
    pub fn request_scan(
        &self,
        origin: ScanOrigin,
        root: PathBuf,
        library_id: String,
        mode: ScanMode,
    ) {
        let pending = PendingScan { origin, root, mode };
        {
            let mut libraries = self.inner.lock_libraries();
            let state = libraries
                .entry(library_id.clone())
                .or_insert_with(LibraryState::new);
            if state.running {
                debug!(
                    "Scan of library {} in flight; queued follow-up ({})",
                    library_id, origin
                );
                match state.queued.as_mut() {
                    Some(follow_up) => follow_up.merge(pending),
                    None => state.queued = Some(FollowUp::new(pending)),
                }
                return;
            }
            state.running = true;
            state.busy.send_replace(true);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(library_id, pending).await;
        });
    }

    /// Run a pass now and return its result, waiting for any pass in flight.
    pub async fn scan_now(
        &self,
        origin: ScanOrigin,
        root: PathBuf,
        library_id: String,
        mode: ScanMode,
    ) -> Result<ScanResult> {
        self.inner
            .run_pass(&library_id, PendingScan { origin, root, mode })
            .await
    }

    /// Resolve once the library has no pass in flight or queued.
    pub async fn wait_idle(&self, library_id: &str) {
        let (mut busy, pass_lock) = {
            let mut libraries = self.inner.lock_libraries();
            let state = libraries
                .entry(library_id.to_string())
                .or_insert_with(LibraryState::new);
            (state.busy.subscribe(), state.pass_lock.clone())
        };
        // The sender lives in the map, which is never pruned.
        let _ = busy.wait_for(|running| !*running).await;
        // Direct `scan_now` passes only hold the pass lock.
        drop(pass_lock.lock().await);
    }
}

impl ScanRequester for SyncOrchestrator {
    fn request_scan(&self, origin: ScanOrigin, root: PathBuf, library_id: String, mode: ScanMode) {
        SyncOrchestrator::request_scan(self, origin, root, library_id, mode);
    }
}

impl Inner {
    fn lock_libraries(&self) -> std::sync::MutexGuard<'_, HashMap<String, LibraryState>> {
        // A panic while holding this lock leaves plain flags behind; keep going.
        self.libraries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pass_lock(&self, library_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_libraries()
            .entry(library_id.to_string())
            .or_insert_with(LibraryState::new)
            .pass_lock
            .clone()
    }

    /// Run the first pass and every follow-up queued behind it.
    async fn drive(self: Arc<Self>, library_id: String, first: PendingScan) {
        let mut passes = VecDeque::from([first]);
        while let Some(pending) = passes.pop_front() {
            // Failures are logged and published inside; never retried.
            let _ = self.run_pass(&library_id, pending).await;
            if !passes.is_empty() {
                continue;
            }

            let follow_up = {
                let mut libraries = self.lock_libraries();
                let state = libraries
                    .entry(library_id.clone())
                    .or_insert_with(LibraryState::new);
                let queued = state.queued.take();
                if queued.is_none() {
                    state.running = false;
                    state.busy.send_replace(false);
                }
                queued
            };
            if let Some(follow_up) = follow_up {
                passes.extend(follow_up.into_passes());
            }
        }
    }

    async fn run_pass(&self, library_id: &str, pending: PendingScan) -> Result<ScanResult> {
        let pass_lock = self.pass_lock(library_id);
        let _guard = pass_lock.lock().await;

        let started = Instant::now();
        let observer = EventObserver {
            events: &self.events,
            library_id,
            origin: pending.origin,
            root: &pending.root,
        };
        info!(
            "Starting {} scan of {} ({:?}) for library {}",
            pending.origin,
            pending.root.display(),
            pending.mode,
            library_id
        );

        match self
            .scanner
            .scan(&pending.root, library_id, &observer)
            .await
        {
            Ok(result) => {
                let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.events.publish(SyncEvent::ScanCompleted {
                    library_id: library_id.to_string(),
                    origin: pending.origin,
                    result: result.clone(),
                });
                self.events.publish(SyncEvent::Resynced {
                    revision,
                    library_id: library_id.to_string(),
                    origin: pending.origin,
                    elapsed_ms,
                    added: result.added_cards,
                    removed: result.removed_cards,
                });
                info!(
                    "Library {} resynced to revision {} in {} ms",
                    library_id, revision, elapsed_ms
                );
                self.spawn_thumbnail_sweep(library_id, &result);
                Ok(result)
            }
            Err(e) => {
                error!(
                    "{} scan of {} failed: {}",
                    pending.origin,
                    pending.root.display(),
                    e
                );
                self.events.publish(SyncEvent::ScanFailed {
                    library_id: library_id.to_string(),
                    origin: pending.origin,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn spawn_thumbnail_sweep(&self, library_id: &str, result: &ScanResult) {
        let sweep = self
            .thumbnail_sweep
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(thumbnails) = sweep else {
            return;
        };
        if result.added_cards + result.updated_cards == 0 {
            return;
        }
        let library_id = library_id.to_string();
        tokio::spawn(async move {
            match thumbnails.generate_missing_for_library(&library_id).await {
                Ok(sweep) => debug!("Thumbnail sweep for {}: {:?}", library_id, sweep),
                Err(e) => warn!("Thumbnail sweep for {} failed: {}", library_id, e),
            }
        });
    }
}

/// Forwards scan callbacks to the event bus.
struct EventObserver<'a> {
    events: &'a EventBus,
    library_id: &'a str,
    origin: ScanOrigin,
    root: &'a Path,
}

impl ScanObserver for EventObserver<'_> {
    fn on_start(&self, total: usize) {
        self.events.publish(SyncEvent::ScanStarted {
            library_id: self.library_id.to_string(),
            origin: self.origin,
            root: self.root.to_path_buf(),
            total_files: total,
        });
    }

    fn on_progress(&self, processed: usize, total: usize) {
        self.events.publish(SyncEvent::ScanProgress {
            library_id: self.library_id.to_string(),
            processed,
            total,
        });
    }
}
