//! Subcommand implementations. Results go to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use cardsync_core::{CardQuery, CardSync, PatternRule, PatternRunOutcome, ScanOrigin};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn watch(sync: &CardSync) -> Result<()> {
    let mut events = sync.subscribe();
    let requested = sync.request_configured_scans(ScanOrigin::Startup);
    if requested.is_empty() {
        warn!("No library roots configured; nothing to watch");
    }
    info!(
        "Watching {} targets; press Ctrl-C to stop",
        sync.watched_targets().len()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }
    Ok(())
}

pub async fn scan(sync: &CardSync, roots: &[PathBuf]) -> Result<()> {
    let mut results = Vec::with_capacity(roots.len());
    for root in roots {
        let result = sync
            .scan_now(ScanOrigin::Manual, root)
            .await
            .with_context(|| format!("scan of {} failed", root.display()))?;
        results.push(json!({ "root": root, "result": result }));
    }
    print_json(&json!({ "revision": sync.revision(), "scans": results }))
}

pub fn libraries(sync: &CardSync) -> Result<()> {
    let mut out = Vec::new();
    for library in sync.list_libraries()? {
        let stats = sync.library_stats(&library.id)?;
        out.push(json!({ "library": library, "stats": stats }));
    }
    print_json(&json!(out))
}

pub fn list(sync: &CardSync, query: CardQuery) -> Result<()> {
    let page = sync.list_cards(&query)?;
    let cards: Vec<_> = page
        .cards
        .iter()
        .map(|card| {
            json!({
                "id": card.id,
                "name": card.name,
                "creator": card.creator,
                "tags": card.tags,
                "file": card.primary_file_path,
            })
        })
        .collect();
    print_json(&json!({
        "total": page.total_count,
        "revision": page.revision,
        "cards": cards,
    }))
}

pub async fn thumbnails(sync: &CardSync, library_id: &str) -> Result<()> {
    let sweep = sync.generate_missing_thumbnails(library_id).await?;
    print_json(&json!(sweep))
}

pub async fn patterns(sync: &CardSync, library_id: &str, rules_path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(rules_path)
        .with_context(|| format!("failed to read {}", rules_path.display()))?;
    let rules: Vec<PatternRule> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a rule list", rules_path.display()))?;

    let entry = match sync.run_patterns(library_id, &rules).await? {
        PatternRunOutcome::Completed(entry) => entry,
        PatternRunOutcome::AlreadyRunning { rule_set_hash } => {
            bail!("a run for rule set {rule_set_hash} is already in progress")
        }
    };
    let matches = sync.pattern_matches(&entry.rule_set_hash)?;
    print_json(&json!({ "status": entry, "matches": matches }))
}
