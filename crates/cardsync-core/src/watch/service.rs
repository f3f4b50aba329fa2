//! Native watchers and their debounce loops.

use crate::config::WatchConfig;
use crate::error::{CardSyncError, Result};
use crate::scan::{ScanMode, ScanOrigin};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::relevance::RelevanceFilter;
use super::{ScanRequester, WatchKey, WatchTarget};

/// What [`WatchService::sync_targets`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchDiff {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    pub unchanged: Vec<String>,
    /// Targets whose watcher could not be created, with the reason.
    pub failed: Vec<(String, String)>,
}

struct RunningWatch {
    key: WatchKey,
    watcher: RecommendedWatcher,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningWatch {
    fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        // Dropping the watcher closes the event channel as well.
        drop(self.watcher);
        drop(self.task);
    }
}

/// Keeps exactly one running watcher per target id.
pub struct WatchService {
    requester: Arc<dyn ScanRequester>,
    running: HashMap<String, RunningWatch>,
}

impl WatchService {
    pub fn new(requester: Arc<dyn ScanRequester>) -> Self {
        Self {
            requester,
            running: HashMap::new(),
        }
    }

    /// Ids of targets with a live watcher.
    pub fn active_targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.running.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Converge the running watchers on `targets`.
    ///
    /// Unchanged targets keep running; changed ones are restarted; ones no
    /// longer listed are stopped. A target that fails to start is reported in
    /// the diff and does not affect the others. Must be called inside a tokio
    /// runtime.
    pub fn sync_targets(&mut self, targets: Vec<WatchTarget>) -> WatchDiff {
        let mut diff = WatchDiff::default();
        let wanted: HashMap<String, WatchTarget> =
            targets.into_iter().map(|t| (t.id.clone(), t)).collect();

        let stale: Vec<String> = self
            .running
            .keys()
            .filter(|id| !wanted.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(watch) = self.running.remove(&id) {
                watch.stop();
                info!("Stopped watching target {}", id);
                diff.stopped.push(id);
            }
        }

        for (id, target) in wanted {
            let key = target.key();
            let restarting = match self.running.get(&id) {
                Some(existing) if existing.key == key => {
                    diff.unchanged.push(id);
                    continue;
                }
                Some(_) => true,
                None => false,
            };

            if let Some(old) = self.running.remove(&id) {
                old.stop();
            }
            match self.start(target, key) {
                Ok(watch) => {
                    self.running.insert(id.clone(), watch);
                    if restarting {
                        diff.restarted.push(id);
                    } else {
                        diff.started.push(id);
                    }
                }
                Err(e) => {
                    warn!("Could not watch target {}: {}", id, e);
                    diff.failed.push((id, e.to_string()));
                }
            }
        }

        diff.started.sort();
        diff.restarted.sort();
        diff.stopped.sort();
        diff.unchanged.sort();
        diff
    }

    /// Stop every watcher.
    pub fn stop_all(&mut self) {
        for (id, watch) in self.running.drain() {
            watch.stop();
            debug!("Stopped watching target {}", id);
        }
    }

    fn start(&self, target: WatchTarget, key: WatchKey) -> Result<RunningWatch> {
        let filter = RelevanceFilter::new(&target)?;
        let (event_tx, event_rx) = mpsc::channel(WatchConfig::EVENT_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| CardSyncError::watch(&target.id, format!("watcher init failed: {e}")))?;

        let recursive = match target.max_depth {
            Some(depth) if depth <= 1 => RecursiveMode::NonRecursive,
            _ => RecursiveMode::Recursive,
        };
        for root in &target.roots {
            watcher.watch(root, recursive).map_err(|e| {
                CardSyncError::watch(&target.id, format!("failed to watch {}: {e}", root.display()))
            })?;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(debounce_loop(
            target.id.clone(),
            filter,
            target.debounce,
            target.library_id.clone(),
            target.mode,
            self.requester.clone(),
            event_rx,
            shutdown_rx,
        ));

        info!(
            "Watching target {} ({} roots, library {})",
            target.id,
            target.roots.len(),
            target.library_id
        );
        Ok(RunningWatch {
            key,
            watcher,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Collapse bursts of relevant events into one request per touched root.
#[allow(clippy::too_many_arguments)]
async fn debounce_loop(
    target_id: String,
    filter: RelevanceFilter,
    debounce: Duration,
    library_id: String,
    mode: ScanMode,
    requester: Arc<dyn ScanRequester>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut touched: BTreeSet<PathBuf> = BTreeSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            event = event_rx.recv() => match event {
                Some(Ok(event)) => {
                    for path in &event.paths {
                        if let Some(root) = filter.relevant_root(&event.kind, path) {
                            touched.insert(root);
                            deadline = Some(Instant::now() + debounce);
                        }
                    }
                }
                Some(Err(err)) => warn!("Watcher error for target {}: {}", target_id, err),
                None => break,
            },
            () = async {
                if let Some(deadline) = deadline {
                    time::sleep_until(deadline).await;
                }
            }, if deadline.is_some() => {
                deadline = None;
                for root in std::mem::take(&mut touched) {
                    debug!("Debounce fired for target {}: {}", target_id, root.display());
                    requester.request_scan(ScanOrigin::Filesystem, root, library_id.clone(), mode);
                }
            }
        }
    }

    debug!("Debounce loop for target {} exited", target_id);
}
