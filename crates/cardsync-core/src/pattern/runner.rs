//! Batch rule evaluation into the pattern cache.

use crate::config::PatternConfig;
use crate::error::{CardSyncError, Result};
use crate::events::{EventBus, SyncEvent};
use crate::index::{CardIndex, PatternCacheEntry, PatternCacheStatus, PatternMatchRecord};
use crate::scan::ProgressThrottle;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{compile_rules, rule_set_hash, PatternRule};

/// How a call to [`PatternRunner::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternRunOutcome {
    /// The run finished and the cache row is `ready`.
    Completed(PatternCacheEntry),
    /// Another run for the same rule set is in progress; nothing was done.
    AlreadyRunning { rule_set_hash: String },
}

/// Computes rule matches for a library and stores them per rule-set hash.
///
/// Runs for different hashes are independent. A second run for a hash that
/// is already running is refused.
#[derive(Clone)]
pub struct PatternRunner {
    index: Arc<CardIndex>,
    events: Option<EventBus>,
    running: Arc<Mutex<HashSet<String>>>,
}

impl PatternRunner {
    pub fn new(index: Arc<CardIndex>) -> Self {
        Self {
            index,
            events: None,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Evaluate `rules` over every card in `library_id`.
    pub async fn run(&self, library_id: &str, rules: &[PatternRule]) -> Result<PatternRunOutcome> {
        let hash = rule_set_hash(rules);
        let Some(_guard) = RunGuard::acquire(&self.running, &hash) else {
            info!("Pattern run for {} already in progress", hash);
            return Ok(PatternRunOutcome::AlreadyRunning {
                rule_set_hash: hash,
            });
        };

        if self.index.get_library(library_id)?.is_none() {
            return Err(CardSyncError::LibraryNotFound {
                library_id: library_id.to_string(),
            });
        }

        let started = Instant::now();
        self.publish(SyncEvent::PatternStarted {
            rule_set_hash: hash.clone(),
            library_id: library_id.to_string(),
            rule_count: rules.len(),
        });

        if let Err(e) = self.execute(&hash, library_id, rules).await {
            error!("Pattern run {} failed: {}", hash, e);
            if let Err(mark_err) = self.index.fail_pattern_run(&hash, &e.to_string()) {
                warn!("Could not mark pattern run {} failed: {}", hash, mark_err);
            }
            self.publish(SyncEvent::PatternFinished {
                rule_set_hash: hash,
                status: PatternCacheStatus::Failed,
                card_count: 0,
                match_count: 0,
            });
            return Err(e);
        }

        let entry = self
            .index
            .pattern_status(&hash)?
            .ok_or_else(|| CardSyncError::Other(format!("pattern cache row {hash} vanished")))?;

        info!(
            "Pattern run {} ready: {} matches over {} cards in {:?}",
            hash,
            entry.match_count,
            entry.card_count,
            started.elapsed()
        );
        self.publish(SyncEvent::PatternFinished {
            rule_set_hash: hash,
            status: entry.status,
            card_count: entry.card_count,
            match_count: entry.match_count,
        });
        Ok(PatternRunOutcome::Completed(entry))
    }

    /// Run in the background. Returns the rule-set hash to poll with
    /// [`status`](Self::status) and the task handle.
    pub fn start(
        &self,
        library_id: impl Into<String>,
        rules: Vec<PatternRule>,
    ) -> (String, JoinHandle<Result<PatternRunOutcome>>) {
        let hash = rule_set_hash(&rules);
        let runner = self.clone();
        let library_id = library_id.into();
        let handle = tokio::spawn(async move { runner.run(&library_id, &rules).await });
        (hash, handle)
    }

    pub fn status(&self, rule_set_hash: &str) -> Result<Option<PatternCacheEntry>> {
        self.index.pattern_status(rule_set_hash)
    }

    pub fn matches(&self, rule_set_hash: &str) -> Result<Vec<PatternMatchRecord>> {
        self.index.pattern_matches(rule_set_hash)
    }

    async fn execute(&self, hash: &str, library_id: &str, rules: &[PatternRule]) -> Result<()> {
        self.index.begin_pattern_run(hash, library_id, rules.len())?;

        let compiled = compile_rules(rules);
        if compiled.is_empty() {
            debug!("Pattern run {} has no usable rules", hash);
            return self.index.finish_pattern_run(hash, 0, 0);
        }

        let cards = self.index.card_texts(library_id)?;
        let total = cards.len();
        let mut throttle = ProgressThrottle::new(PatternConfig::PROGRESS_INTERVAL);
        let mut matches = Vec::new();

        for (i, (card_id, text)) in cards.into_iter().enumerate() {
            let rule_ids: Vec<String> = compiled
                .iter()
                .filter(|rule| rule.regex.is_match(&text))
                .map(|rule| rule.id.clone())
                .collect();
            if !rule_ids.is_empty() {
                matches.push(PatternMatchRecord { card_id, rule_ids });
            }

            let processed = i + 1;
            if throttle.tick(processed, total) {
                self.publish(SyncEvent::PatternProgress {
                    rule_set_hash: hash.to_string(),
                    processed,
                    total,
                });
            }
            if processed % PatternConfig::YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        let stored = self.index.store_pattern_matches(hash, &matches)?;
        self.index.finish_pattern_run(hash, total, stored)
    }

    fn publish(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Marks a hash as running until dropped.
struct RunGuard {
    running: Arc<Mutex<HashSet<String>>>,
    hash: String,
}

impl RunGuard {
    fn acquire(running: &Arc<Mutex<HashSet<String>>>, hash: &str) -> Option<Self> {
        let inserted = running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(hash.to_string());
        inserted.then(|| Self {
            running: running.clone(),
            hash: hash.to_string(),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::card_png;
    use crate::scan::{NoopObserver, ScanEngine};
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Setup {
        _temp: TempDir,
        index: Arc<CardIndex>,
        library_id: String,
    }

    /// Ten cards, three of which mention a dragon.
    async fn setup() -> Setup {
        let temp = TempDir::new().unwrap();
        let root: PathBuf = temp.path().join("library");
        std::fs::create_dir_all(&root).unwrap();
        for i in 0..10 {
            let description = if i % 4 == 0 {
                format!("Card {i} rides a Dragon")
            } else {
                format!("Card {i} tends a garden")
            };
            let payload = json!({"spec": "chara_card_v2", "spec_version": "2.0", "data": {
                "name": format!("Card {i}"), "description": description
            }});
            std::fs::write(root.join(format!("{i}.png")), card_png(&payload)).unwrap();
        }

        let index = Arc::new(CardIndex::new(temp.path().join("cards.db")).unwrap());
        let library_id = index.ensure_library(&root).unwrap().id;
        ScanEngine::new(index.clone())
            .scan_folder(&root, &library_id, &NoopObserver)
            .await
            .unwrap();
        Setup {
            _temp: temp,
            index,
            library_id,
        }
    }

    fn completed(outcome: PatternRunOutcome) -> PatternCacheEntry {
        match outcome {
            PatternRunOutcome::Completed(entry) => entry,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_records_sparse_matches() {
        let s = setup().await;
        let runner = PatternRunner::new(s.index.clone());
        let rules = vec![PatternRule::new("dragons", "dragon", "i")];

        let entry = completed(runner.run(&s.library_id, &rules).await.unwrap());
        assert_eq!(entry.status, PatternCacheStatus::Ready);
        assert_eq!(entry.card_count, 10);
        assert_eq!(entry.match_count, 3);

        let matches = runner.matches(&rule_set_hash(&rules)).unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.rule_ids == vec!["dragons".to_string()]));
    }

    #[tokio::test]
    async fn test_rerun_replaces_matches() {
        let s = setup().await;
        let runner = PatternRunner::new(s.index.clone());
        let rules = vec![
            PatternRule::new("dragons", "dragon", "i"),
            PatternRule::new("gardens", "garden", ""),
        ];
        let hash = rule_set_hash(&rules);

        completed(runner.run(&s.library_id, &rules).await.unwrap());
        let first = runner.matches(&hash).unwrap();
        completed(runner.run(&s.library_id, &rules).await.unwrap());
        let second = runner.matches(&hash).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 10);
    }

    #[tokio::test]
    async fn test_invalid_rule_does_not_fail_run() {
        let s = setup().await;
        let runner = PatternRunner::new(s.index.clone());
        let rules = vec![
            PatternRule::new("broken", "([", ""),
            PatternRule::new("dragons", "Dragon", ""),
        ];

        let entry = completed(runner.run(&s.library_id, &rules).await.unwrap());
        assert_eq!(entry.status, PatternCacheStatus::Ready);
        assert_eq!(entry.rule_count, 2);
        let matches = runner.matches(&entry.rule_set_hash).unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches
            .iter()
            .all(|m| !m.rule_ids.contains(&"broken".to_string())));
    }

    #[tokio::test]
    async fn test_zero_rules_is_immediately_ready() {
        let s = setup().await;
        let runner = PatternRunner::new(s.index.clone());

        let entry = completed(runner.run(&s.library_id, &[]).await.unwrap());
        assert_eq!(entry.status, PatternCacheStatus::Ready);
        assert_eq!(entry.match_count, 0);
        assert!(runner.matches(&entry.rule_set_hash).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_hash_is_refused_while_running() {
        let s = setup().await;
        let runner = PatternRunner::new(s.index.clone());
        let rules = vec![PatternRule::new("dragons", "dragon", "i")];
        let hash = rule_set_hash(&rules);

        let guard = RunGuard::acquire(&runner.running, &hash).unwrap();
        assert_eq!(
            runner.run(&s.library_id, &rules).await.unwrap(),
            PatternRunOutcome::AlreadyRunning {
                rule_set_hash: hash.clone()
            }
        );

        // A different rule set is unaffected.
        let other = vec![PatternRule::new("gardens", "garden", "")];
        completed(runner.run(&s.library_id, &other).await.unwrap());

        drop(guard);
        completed(runner.run(&s.library_id, &rules).await.unwrap());
    }

    #[tokio::test]
    async fn test_start_publishes_progress_and_finish() {
        let s = setup().await;
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let runner = PatternRunner::new(s.index.clone()).with_events(events);

        let (hash, handle) = runner.start(
            s.library_id.clone(),
            vec![PatternRule::new("dragons", "dragon", "i")],
        );
        completed(handle.await.unwrap().unwrap());
        assert_eq!(
            runner.status(&hash).unwrap().unwrap().status,
            PatternCacheStatus::Ready
        );

        let mut last_progress = None;
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                SyncEvent::PatternProgress {
                    processed, total, ..
                } => last_progress = Some((processed, total)),
                SyncEvent::PatternFinished { match_count, .. } => finished = Some(match_count),
                _ => {}
            }
        }
        assert_eq!(last_progress, Some((10, 10)));
        assert_eq!(finished, Some(3));
    }

    #[tokio::test]
    async fn test_unknown_library() {
        let s = setup().await;
        let runner = PatternRunner::new(s.index.clone());
        assert!(matches!(
            runner
                .run("missing", &[PatternRule::new("r", "x", "")])
                .await,
            Err(CardSyncError::LibraryNotFound { .. })
        ));
    }
}
