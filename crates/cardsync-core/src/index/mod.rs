//! SQLite card index with FTS5 full-text search.
//!
//! This module provides:
//! - Library, card, file and tag storage
//! - Statement-level writes composed into scan batch transactions
//! - Card listing, tag filtering and full-text search
//! - The pattern rule cache

mod card_index;
mod fts5;
mod pattern_cache;
mod query;
mod records;
pub mod writes;

pub use card_index::{canonical_root, library_id_for_path, CardIndex};
pub use fts5::{FTS5Config, FTS5Manager};
pub use pattern_cache::{PatternCacheEntry, PatternCacheStatus, PatternMatchRecord};
pub use query::{build_fts5_query, escape_fts5_term};
pub use records::{
    CardFileRecord, CardPage, CardQuery, CardRecord, FileStamp, KnownFile, LibraryRecord,
    LibraryStats,
};
