//! Row types returned by the card index.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A synchronization root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRecord {
    pub id: String,
    pub root_path: PathBuf,
    pub created_at: String,
    pub last_scan_at: Option<String>,
}

/// A logical card, deduplicated by content hash within its library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: String,
    pub library_id: String,
    pub content_hash: String,
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    pub first_message: String,
    pub alternate_greetings: Vec<String>,
    pub example_dialogue: String,
    pub creator_notes: String,
    pub system_prompt: String,
    pub post_history_instructions: String,
    pub creator: String,
    pub character_version: String,
    pub tags: Vec<String>,
    pub schema_version: String,
    pub has_lorebook: bool,
    pub has_alternate_greetings: bool,
    pub has_system_prompt: bool,
    pub lorebook_hash: Option<String>,
    pub primary_file_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub created_at: String,
    pub updated_at: String,
}

/// One physical file backing a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFileRecord {
    pub path: PathBuf,
    pub card_id: String,
    pub library_id: String,
    pub folder: PathBuf,
    pub size: u64,
    pub mtime_ms: i64,
    pub birthtime_ms: i64,
    pub indexed_at: String,
}

/// Filesystem identity of a file as seen by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStamp {
    pub size: u64,
    pub mtime_ms: i64,
    pub birthtime_ms: i64,
}

impl FileStamp {
    /// Read the stamp from filesystem metadata. Platforms without a birth
    /// time fall back to the modification time.
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime_ms = meta.modified().map(system_time_ms).unwrap_or(0);
        let birthtime_ms = meta.created().map(system_time_ms).unwrap_or(mtime_ms);
        Self {
            size: meta.len(),
            mtime_ms,
            birthtime_ms,
        }
    }
}

fn system_time_ms(time: std::time::SystemTime) -> i64 {
    match time.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// What the index already knows about a path, for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownFile {
    pub card_id: String,
    pub stamp: FileStamp,
    /// Whether the owning card's derived search text is populated.
    pub derived_ready: bool,
}

/// Filter for card listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardQuery {
    pub library_id: Option<String>,
    /// Cards must carry every listed tag (case-insensitive).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Full-text query over name, creator and searchable text.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for CardQuery {
    fn default() -> Self {
        Self {
            library_id: None,
            tags: Vec::new(),
            text: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// One page of cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPage {
    pub cards: Vec<CardRecord>,
    pub total_count: usize,
    /// Sync revision the page was read at.
    pub revision: u64,
    pub query_time_ms: f64,
}

/// Row counts for a library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub cards: usize,
    pub files: usize,
    pub tags: usize,
}
