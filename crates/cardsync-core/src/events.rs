//! In-process notification bus.
//!
//! Delivery is best effort: subscribers that fall behind lose the oldest
//! events and nothing is replayed.

use crate::index::PatternCacheStatus;
use crate::scan::{ScanOrigin, ScanResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Everything the sync engine announces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    #[serde(rename_all = "camelCase")]
    ScanStarted {
        library_id: String,
        origin: ScanOrigin,
        root: PathBuf,
        total_files: usize,
    },
    #[serde(rename_all = "camelCase")]
    ScanProgress {
        library_id: String,
        processed: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    ScanCompleted {
        library_id: String,
        origin: ScanOrigin,
        result: ScanResult,
    },
    #[serde(rename_all = "camelCase")]
    ScanFailed {
        library_id: String,
        origin: ScanOrigin,
        error: String,
    },
    /// A pass finished and the index revision moved.
    #[serde(rename_all = "camelCase")]
    Resynced {
        revision: u64,
        library_id: String,
        origin: ScanOrigin,
        elapsed_ms: u64,
        added: usize,
        removed: usize,
    },
    #[serde(rename_all = "camelCase")]
    ThumbnailReady { card_id: String, path: PathBuf },
    #[serde(rename_all = "camelCase")]
    PatternStarted {
        rule_set_hash: String,
        library_id: String,
        rule_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    PatternProgress {
        rule_set_hash: String,
        processed: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    PatternFinished {
        rule_set_hash: String,
        status: PatternCacheStatus,
        card_count: usize,
        match_count: usize,
    },
}

/// Broadcast bus for [`SyncEvent`]s. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = SyncEvent::ThumbnailReady {
            card_id: "c1".to_string(),
            path: PathBuf::from("/t/c1.jpg"),
        };
        assert_eq!(bus.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        assert_eq!(
            bus.publish(SyncEvent::ScanProgress {
                library_id: "l".to_string(),
                processed: 1,
                total: 2,
            }),
            0
        );
    }

    #[test]
    fn test_events_serialize_tagged_camel_case() {
        let value = serde_json::to_value(SyncEvent::Resynced {
            revision: 7,
            library_id: "lib".to_string(),
            origin: ScanOrigin::Filesystem,
            elapsed_ms: 12,
            added: 1,
            removed: 0,
        })
        .unwrap();
        assert_eq!(value["type"], "resynced");
        assert_eq!(value["libraryId"], "lib");
        assert_eq!(value["origin"], "filesystem");
        assert_eq!(value["elapsedMs"], 12);
    }
}
