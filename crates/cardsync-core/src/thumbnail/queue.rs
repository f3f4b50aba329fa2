//! Bounded, de-duplicated thumbnail generation.

use crate::config::ThumbnailConfig;
use crate::error::{CardSyncError, Result};
use crate::events::{EventBus, SyncEvent};
use crate::index::CardIndex;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ImageThumbnailGenerator, ThumbnailError, ThumbnailGenerator};

type SharedGeneration = Shared<BoxFuture<'static, std::result::Result<PathBuf, ThumbnailError>>>;

/// Counts from one library-wide sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailSweep {
    pub generated: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Generates thumbnails on demand.
///
/// Concurrent requests for one card share a single generation, and at most
/// `concurrency` generations run at a time. A generation runs on its own
/// task, so a caller that stops waiting does not cancel it.
pub struct ThumbnailQueue {
    index: Arc<CardIndex>,
    thumbnail_dir: PathBuf,
    generator: Arc<dyn ThumbnailGenerator>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    in_flight: Arc<Mutex<HashMap<String, SharedGeneration>>>,
    events: Option<EventBus>,
}

impl ThumbnailQueue {
    pub fn new(index: Arc<CardIndex>, thumbnail_dir: impl Into<PathBuf>) -> Result<Self> {
        let thumbnail_dir = thumbnail_dir.into();
        std::fs::create_dir_all(&thumbnail_dir)
            .map_err(|e| CardSyncError::io_with_path(e, &thumbnail_dir))?;

        Ok(Self {
            index,
            thumbnail_dir,
            generator: Arc::new(ImageThumbnailGenerator::default()),
            permits: Arc::new(Semaphore::new(ThumbnailConfig::CONCURRENCY)),
            concurrency: ThumbnailConfig::CONCURRENCY,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            events: None,
        })
    }

    pub fn with_generator(mut self, generator: Arc<dyn ThumbnailGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        self.concurrency = concurrency;
        self.permits = Arc::new(Semaphore::new(concurrency));
        self
    }

    /// Publish `ThumbnailReady` for each generated artifact.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    /// Where a card's artifact lives, whether or not it exists yet.
    pub fn thumbnail_path(&self, card_id: &str) -> PathBuf {
        self.thumbnail_dir
            .join(format!("{}.{}", card_id, ThumbnailConfig::EXTENSION))
    }

    /// Return the card's artifact, generating it first if needed.
    pub async fn ensure_thumbnail(
        &self,
        card_id: &str,
    ) -> std::result::Result<PathBuf, ThumbnailError> {
        if !is_plain_id(card_id) {
            return Err(ThumbnailError::CardNotFound(card_id.to_string()));
        }

        let dest = self.thumbnail_path(card_id);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Ok(dest);
        }

        let generation = {
            let mut in_flight = self.lock_in_flight();
            match in_flight.get(card_id) {
                Some(existing) => {
                    debug!("Joining in-flight thumbnail for {}", card_id);
                    existing.clone()
                }
                None => {
                    let generation = self.spawn_generation(card_id, dest);
                    in_flight.insert(card_id.to_string(), generation.clone());
                    generation
                }
            }
        };

        generation.await
    }

    /// Like [`ensure_thumbnail`](Self::ensure_thumbnail) but gives up waiting
    /// after `timeout` with [`ThumbnailError::Pending`].
    pub async fn ensure_thumbnail_within(
        &self,
        card_id: &str,
        timeout: Duration,
    ) -> std::result::Result<PathBuf, ThumbnailError> {
        tokio::time::timeout(timeout, self.ensure_thumbnail(card_id))
            .await
            .unwrap_or(Err(ThumbnailError::Pending))
    }

    /// Generate every missing artifact in a library.
    pub async fn generate_missing_for_library(&self, library_id: &str) -> Result<ThumbnailSweep> {
        if self.index.get_library(library_id)?.is_none() {
            return Err(CardSyncError::LibraryNotFound {
                library_id: library_id.to_string(),
            });
        }

        let mut sweep = ThumbnailSweep::default();
        let mut missing = Vec::new();
        for card_id in self.index.card_ids(library_id)? {
            if self.thumbnail_path(&card_id).exists() {
                sweep.already_present += 1;
            } else {
                missing.push(card_id);
            }
        }

        let outcomes: Vec<_> = stream::iter(missing)
            .map(|card_id| async move {
                let outcome = self.ensure_thumbnail(&card_id).await;
                (card_id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (card_id, outcome) in outcomes {
            match outcome {
                Ok(_) => sweep.generated += 1,
                Err(e) => {
                    debug!("No thumbnail for card {}: {}", card_id, e);
                    sweep.failed += 1;
                }
            }
        }

        info!(
            "Thumbnail sweep for {}: {} generated, {} present, {} failed",
            library_id, sweep.generated, sweep.already_present, sweep.failed
        );
        Ok(sweep)
    }

    /// Delete a card's artifact. Missing artifacts are not an error.
    pub async fn remove(&self, card_id: &str) -> Result<()> {
        if !is_plain_id(card_id) {
            return Ok(());
        }
        let path = self.thumbnail_path(card_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed thumbnail {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CardSyncError::io_with_path(e, path)),
        }
    }

    /// Drop the artifact of a card whose content changed and clear its
    /// recorded path, so the next request regenerates it.
    pub async fn invalidate(&self, card_id: &str) -> Result<()> {
        self.remove(card_id).await?;
        self.index.set_thumbnail_path(card_id, None)?;
        Ok(())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, SharedGeneration>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_generation(&self, card_id: &str, dest: PathBuf) -> SharedGeneration {
        let job = Generation {
            index: self.index.clone(),
            generator: self.generator.clone(),
            permits: self.permits.clone(),
            events: self.events.clone(),
            card_id: card_id.to_string(),
            dest,
        };
        let in_flight = self.in_flight.clone();
        let key = card_id.to_string();

        let handle = tokio::spawn(async move {
            let outcome = job.run().await;
            in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&key);
            outcome
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(ThumbnailError::GenerationFailed(format!(
                    "generation task failed: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }
}

/// Everything one generation needs, owned so it can run on its own task.
struct Generation {
    index: Arc<CardIndex>,
    generator: Arc<dyn ThumbnailGenerator>,
    permits: Arc<Semaphore>,
    events: Option<EventBus>,
    card_id: String,
    dest: PathBuf,
}

impl Generation {
    async fn run(self) -> std::result::Result<PathBuf, ThumbnailError> {
        if self.index.get_card(&self.card_id).map_err(failed)?.is_none() {
            return Err(ThumbnailError::CardNotFound(self.card_id));
        }
        let Some(source) = self.index.backing_file(&self.card_id).map_err(failed)? else {
            return Err(ThumbnailError::SourceMissing(self.card_id));
        };
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(ThumbnailError::SourceMissing(self.card_id));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ThumbnailError::GenerationFailed("thumbnail queue closed".to_string()))?;

        let generator = self.generator.clone();
        let dest = self.dest.clone();
        tokio::task::spawn_blocking(move || generator.generate(&source, &dest))
            .await
            .map_err(|e| ThumbnailError::GenerationFailed(e.to_string()))?
            .map_err(failed)?;

        match self.index.set_thumbnail_path(&self.card_id, Some(&self.dest)) {
            Ok(true) => {}
            Ok(false) => {
                // Removed while we were generating.
                let _ = tokio::fs::remove_file(&self.dest).await;
                return Err(ThumbnailError::CardNotFound(self.card_id));
            }
            Err(e) => warn!("Failed to record thumbnail for {}: {}", self.card_id, e),
        }

        debug!("Generated thumbnail {}", self.dest.display());
        if let Some(events) = &self.events {
            events.publish(SyncEvent::ThumbnailReady {
                card_id: self.card_id.clone(),
                path: self.dest.clone(),
            });
        }
        Ok(self.dest)
    }
}

fn failed(err: CardSyncError) -> ThumbnailError {
    ThumbnailError::GenerationFailed(err.to_string())
}

/// Card ids become file names; anything else never names a card.
fn is_plain_id(card_id: &str) -> bool {
    !card_id.is_empty()
        && card_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
