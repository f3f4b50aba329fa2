//! SQLite card index.

use crate::config::IndexConfig;
use crate::error::{CardSyncError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::fts5::{FTS5Config, FTS5Manager};
use super::query::build_fts5_query;
use super::records::{
    CardFileRecord, CardPage, CardQuery, CardRecord, FileStamp, KnownFile, LibraryRecord,
    LibraryStats,
};
use super::writes::path_text;

/// Stable library id for a root path (UUID v5 in the URL namespace).
pub fn library_id_for_path(root: &Path) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path_text(root).as_bytes()).to_string()
}

/// Canonical form of a root, or the path unchanged when it cannot be resolved.
pub fn canonical_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

const CARD_COLUMNS: &str = "c.id, c.library_id, c.content_hash, c.name, c.description, \
     c.personality, c.scenario, c.first_message, c.alternate_greetings_json, \
     c.example_dialogue, c.creator_notes, c.system_prompt, c.post_history_instructions, \
     c.creator, c.character_version, c.schema_version, c.has_lorebook, \
     c.has_alternate_greetings, c.has_system_prompt, c.lorebook_hash, \
     c.primary_file_path, c.thumbnail_path, c.created_at, c.updated_at, \
     (SELECT json_group_array(t.name) FROM card_tags ct JOIN tags t ON t.id = ct.tag_id \
      WHERE ct.card_id = c.id) AS tags_json";

/// SQLite card index with FTS5 search.
pub struct CardIndex {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    fts5_config: FTS5Config,
}

impl CardIndex {
    /// Create or open the index database at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CardSyncError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        let index = Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
            fts5_config: FTS5Config::default(),
        };
        index.ensure_fts5()?;

        Ok(index)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout={};
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            ",
            IndexConfig::BUSY_TIMEOUT_MS
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS libraries (
                id TEXT PRIMARY KEY,
                root_path TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                last_scan_at TEXT
            );

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
                content_hash TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                personality TEXT NOT NULL DEFAULT '',
                scenario TEXT NOT NULL DEFAULT '',
                first_message TEXT NOT NULL DEFAULT '',
                alternate_greetings_json TEXT NOT NULL DEFAULT '[]',
                example_dialogue TEXT NOT NULL DEFAULT '',
                creator_notes TEXT NOT NULL DEFAULT '',
                system_prompt TEXT NOT NULL DEFAULT '',
                post_history_instructions TEXT NOT NULL DEFAULT '',
                creator TEXT NOT NULL DEFAULT '',
                character_version TEXT NOT NULL DEFAULT '',
                extensions_json TEXT NOT NULL DEFAULT '{}',
                raw_json TEXT NOT NULL,
                schema_version TEXT NOT NULL,
                has_lorebook INTEGER NOT NULL DEFAULT 0,
                has_alternate_greetings INTEGER NOT NULL DEFAULT 0,
                has_system_prompt INTEGER NOT NULL DEFAULT 0,
                lorebook_hash TEXT,
                search_text TEXT,
                primary_file_path TEXT,
                thumbnail_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (library_id, content_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_cards_library ON cards(library_id);

            CREATE TABLE IF NOT EXISTS card_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                library_id TEXT NOT NULL,
                path TEXT NOT NULL UNIQUE,
                folder TEXT NOT NULL,
                size INTEGER NOT NULL,
                mtime_ms INTEGER NOT NULL,
                birthtime_ms INTEGER NOT NULL,
                indexed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_card_files_card ON card_files(card_id);
            CREATE INDEX IF NOT EXISTS idx_card_files_library ON card_files(library_id);

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE
            );

            CREATE TABLE IF NOT EXISTS card_tags (
                card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (card_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_card_tags_tag ON card_tags(tag_id);

            CREATE TABLE IF NOT EXISTS pattern_rule_cache (
                rule_set_hash TEXT PRIMARY KEY,
                library_id TEXT NOT NULL,
                status TEXT NOT NULL,
                rule_count INTEGER NOT NULL DEFAULT 0,
                card_count INTEGER NOT NULL DEFAULT 0,
                match_count INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE TABLE IF NOT EXISTS pattern_matches (
                rule_set_hash TEXT NOT NULL
                    REFERENCES pattern_rule_cache(rule_set_hash) ON DELETE CASCADE,
                card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                rule_ids_json TEXT NOT NULL,
                PRIMARY KEY (rule_set_hash, card_id)
            );
            ",
        )?;
        Ok(())
    }

    fn ensure_fts5(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        FTS5Manager::new(&self.fts5_config).ensure_setup(&conn)
    }

    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CardSyncError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ---------------------------------------------------------------------
    // Libraries
    // ---------------------------------------------------------------------

    /// Register a root on first reference and return its record.
    pub fn ensure_library(&self, root: &Path) -> Result<LibraryRecord> {
        let root = canonical_root(root);
        let id = library_id_for_path(&root);
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO libraries (id, root_path, created_at) VALUES (?1, ?2, ?3)",
            params![id, path_text(&root), Utc::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            info!("Registered library {} at {}", id, root.display());
        }
        Self::library_row(&conn, &id)?.ok_or(CardSyncError::LibraryNotFound { library_id: id })
    }

    pub fn get_library(&self, library_id: &str) -> Result<Option<LibraryRecord>> {
        let conn = self.lock_conn()?;
        Self::library_row(&conn, library_id)
    }

    pub fn list_libraries(&self) -> Result<Vec<LibraryRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, root_path, created_at, last_scan_at FROM libraries ORDER BY root_path",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_library)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Stamp the library's last completed scan.
    pub fn mark_scanned(&self, library_id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE libraries SET last_scan_at = ?2 WHERE id = ?1",
            params![library_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn library_row(conn: &Connection, library_id: &str) -> Result<Option<LibraryRecord>> {
        Ok(conn
            .query_row(
                "SELECT id, root_path, created_at, last_scan_at FROM libraries WHERE id = ?1",
                [library_id],
                Self::row_to_library,
            )
            .optional()?)
    }

    fn row_to_library(row: &Row) -> rusqlite::Result<LibraryRecord> {
        Ok(LibraryRecord {
            id: row.get(0)?,
            root_path: PathBuf::from(row.get::<_, String>(1)?),
            created_at: row.get(2)?,
            last_scan_at: row.get(3)?,
        })
    }

    // ---------------------------------------------------------------------
    // Scan support
    // ---------------------------------------------------------------------

    /// Every indexed file of a library with the stamp it was indexed at.
    pub fn known_files(&self, library_id: &str) -> Result<HashMap<PathBuf, KnownFile>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT f.path, f.card_id, f.size, f.mtime_ms, f.birthtime_ms,
                    c.search_text IS NOT NULL
             FROM card_files f JOIN cards c ON c.id = f.card_id
             WHERE f.library_id = ?1",
        )?;
        let rows = stmt.query_map([library_id], |row| {
            Ok((
                PathBuf::from(row.get::<_, String>(0)?),
                KnownFile {
                    card_id: row.get(1)?,
                    stamp: FileStamp {
                        size: row.get::<_, i64>(2)? as u64,
                        mtime_ms: row.get(3)?,
                        birthtime_ms: row.get(4)?,
                    },
                    derived_ready: row.get(5)?,
                },
            ))
        })?;

        let mut known = HashMap::new();
        for row in rows {
            let (path, file) = row?;
            known.insert(path, file);
        }
        debug!("Loaded {} known files for library {}", known.len(), library_id);
        Ok(known)
    }

    // ---------------------------------------------------------------------
    // Card queries
    // ---------------------------------------------------------------------

    pub fn get_card(&self, card_id: &str) -> Result<Option<CardRecord>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards c WHERE c.id = ?1");
        Ok(conn
            .query_row(&sql, [card_id], Self::row_to_card)
            .optional()?)
    }

    /// Ids of every card in a library.
    pub fn card_ids(&self, library_id: &str) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM cards WHERE library_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([library_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Files backing a card, oldest first.
    pub fn card_files(&self, card_id: &str) -> Result<Vec<CardFileRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, card_id, library_id, folder, size, mtime_ms, birthtime_ms, indexed_at
             FROM card_files WHERE card_id = ?1 ORDER BY birthtime_ms, path",
        )?;
        let files = stmt
            .query_map([card_id], |row| {
                Ok(CardFileRecord {
                    path: PathBuf::from(row.get::<_, String>(0)?),
                    card_id: row.get(1)?,
                    library_id: row.get(2)?,
                    folder: PathBuf::from(row.get::<_, String>(3)?),
                    size: row.get::<_, i64>(4)? as u64,
                    mtime_ms: row.get(5)?,
                    birthtime_ms: row.get(6)?,
                    indexed_at: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// File to derive artifacts from: the primary file while it is still
    /// indexed, else the earliest-born file.
    pub fn backing_file(&self, card_id: &str) -> Result<Option<PathBuf>> {
        let conn = self.lock_conn()?;
        let path: Option<String> = conn
            .query_row(
                "SELECT f.path FROM card_files f
                 LEFT JOIN cards c ON c.id = f.card_id AND c.primary_file_path = f.path
                 WHERE f.card_id = ?1
                 ORDER BY c.id IS NULL, f.birthtime_ms, f.path
                 LIMIT 1",
                [card_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    /// Record (or clear) a card's thumbnail path. Returns whether the card exists.
    pub fn set_thumbnail_path(&self, card_id: &str, path: Option<&Path>) -> Result<bool> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE cards SET thumbnail_path = ?2 WHERE id = ?1",
            params![card_id, path.map(path_text)],
        )?;
        Ok(updated > 0)
    }

    /// Page through cards with optional library, tag and text filters.
    pub fn list_cards(&self, query: &CardQuery, revision: u64) -> Result<CardPage> {
        let start = Instant::now();
        let conn = self.lock_conn()?;

        let fts_query = query
            .text
            .as_deref()
            .map(build_fts5_query)
            .filter(|q| !q.is_empty());

        let table = &self.fts5_config.table_name;
        let mut from = "cards c".to_string();
        let mut where_parts: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(fts) = &fts_query {
            from = format!("{table} JOIN cards c ON c.id = {table}.id");
            where_parts.push(format!("{table} MATCH ?"));
            params_vec.push(Box::new(fts.clone()));
        }
        if let Some(library_id) = &query.library_id {
            where_parts.push("c.library_id = ?".to_string());
            params_vec.push(Box::new(library_id.clone()));
        }
        for tag in &query.tags {
            where_parts.push(
                "EXISTS (SELECT 1 FROM card_tags ct JOIN tags t ON t.id = ct.tag_id \
                 WHERE ct.card_id = c.id AND t.name = ?)"
                    .to_string(),
            );
            params_vec.push(Box::new(tag.clone()));
        }

        let where_clause = if where_parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_parts.join(" AND "))
        };
        let order = if fts_query.is_some() {
            format!("{table}.rank, c.id")
        } else {
            "c.name COLLATE NOCASE, c.id".to_string()
        };
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM {from} {where_clause}");
        let total_count: usize =
            match conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0)) {
                Ok(count) => count,
                Err(e) if fts_query.is_some() => {
                    error!("FTS5 count query failed: {}", e);
                    0
                }
                Err(e) => return Err(e.into()),
            };

        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM {from} {where_clause} ORDER BY {order} LIMIT {} OFFSET {}",
            query.limit, query.offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let cards = match stmt
            .query_map(params_refs.as_slice(), Self::row_to_card)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        {
            Ok(cards) => cards,
            Err(e) if fts_query.is_some() => {
                error!("FTS5 search failed: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CardPage {
            cards,
            total_count,
            revision,
            query_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Card id plus the concatenated fixed text fields, for pattern matching.
    pub fn card_texts(&self, library_id: &str) -> Result<Vec<(String, String)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, personality, scenario, first_message,
                    alternate_greetings_json, example_dialogue, creator_notes,
                    system_prompt, post_history_instructions
             FROM cards WHERE library_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([library_id], |row| {
                let greetings: Vec<String> =
                    serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default();
                let mut parts: Vec<String> = Vec::with_capacity(10 + greetings.len());
                for idx in 1..=5 {
                    parts.push(row.get(idx)?);
                }
                parts.extend(greetings);
                for idx in 7..=10 {
                    parts.push(row.get(idx)?);
                }
                Ok((row.get::<_, String>(0)?, parts.join("\n")))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn stats(&self, library_id: &str) -> Result<LibraryStats> {
        let conn = self.lock_conn()?;
        let count = |sql: &str| -> Result<usize> {
            Ok(conn.query_row(sql, [library_id], |row| row.get(0))?)
        };
        Ok(LibraryStats {
            cards: count("SELECT COUNT(*) FROM cards WHERE library_id = ?1")?,
            files: count("SELECT COUNT(*) FROM card_files WHERE library_id = ?1")?,
            tags: count(
                "SELECT COUNT(DISTINCT ct.tag_id) FROM card_tags ct
                 JOIN cards c ON c.id = ct.card_id WHERE c.library_id = ?1",
            )?,
        })
    }

    /// Drop and rebuild the full-text table from `cards`.
    pub fn rebuild_search(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        FTS5Manager::new(&self.fts5_config).rebuild(&conn)
    }

    /// Truncate the WAL after large scans.
    pub fn checkpoint_wal(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!("Checkpointed WAL for {}", self.db_path.display());
        Ok(())
    }

    fn row_to_card(row: &Row) -> rusqlite::Result<CardRecord> {
        let greetings_json: String = row.get(8)?;
        let tags_json: Option<String> = row.get(24)?;
        let mut tags: Vec<String> = tags_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        tags.sort_by_key(|t| t.to_lowercase());

        Ok(CardRecord {
            id: row.get(0)?,
            library_id: row.get(1)?,
            content_hash: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            personality: row.get(5)?,
            scenario: row.get(6)?,
            first_message: row.get(7)?,
            alternate_greetings: serde_json::from_str(&greetings_json).unwrap_or_default(),
            example_dialogue: row.get(9)?,
            creator_notes: row.get(10)?,
            system_prompt: row.get(11)?,
            post_history_instructions: row.get(12)?,
            creator: row.get(13)?,
            character_version: row.get(14)?,
            tags,
            schema_version: row.get(15)?,
            has_lorebook: row.get(16)?,
            has_alternate_greetings: row.get(17)?,
            has_system_prompt: row.get(18)?,
            lorebook_hash: row.get(19)?,
            primary_file_path: row.get::<_, Option<String>>(20)?.map(PathBuf::from),
            thumbnail_path: row.get::<_, Option<String>>(21)?.map(PathBuf::from),
            created_at: row.get(22)?,
            updated_at: row.get(23)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writes;
    use crate::parser::{ParsedCard, SchemaVersion};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_index() -> (CardIndex, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let index = CardIndex::new(temp_dir.path().join("db").join("cards.db")).unwrap();
        (index, temp_dir)
    }

    fn parsed(name: &str, description: &str, tags: &[&str]) -> ParsedCard {
        ParsedCard {
            name: name.to_string(),
            description: description.to_string(),
            personality: String::new(),
            scenario: String::new(),
            first_message: "Hello".to_string(),
            alternate_greetings: vec!["Hi there".to_string()],
            example_dialogue: String::new(),
            creator_notes: String::new(),
            system_prompt: String::new(),
            post_history_instructions: String::new(),
            creator: "anon".to_string(),
            character_version: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            lorebook: None,
            extensions: json!({}),
            schema: SchemaVersion::V2,
            raw: json!({"name": name}),
        }
    }

    fn add_card(index: &CardIndex, library_id: &str, id: &str, card: &ParsedCard, path: &Path) {
        let now = Utc::now().to_rfc3339();
        let stamp = FileStamp {
            size: 10,
            mtime_ms: 1,
            birthtime_ms: 1,
        };
        index
            .write(|tx| {
                writes::insert_card(tx, id, library_id, &format!("hash-{id}"), card, path, &now)?;
                writes::upsert_card_file(tx, id, library_id, path, &stamp, &now)?;
                writes::replace_card_tags(tx, id, &card.tags)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_library_id_is_stable() {
        let (index, temp) = create_test_index();
        let a = index.ensure_library(temp.path()).unwrap();
        let b = index.ensure_library(temp.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id, library_id_for_path(&canonical_root(temp.path())));
        assert_eq!(index.list_libraries().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_and_get_card() {
        let (index, temp) = create_test_index();
        let lib = index.ensure_library(temp.path()).unwrap();
        let path = temp.path().join("aria.png");
        add_card(&index, &lib.id, "c1", &parsed("Aria", "An elf", &["Elf", "fantasy"]), &path);

        let card = index.get_card("c1").unwrap().unwrap();
        assert_eq!(card.name, "Aria");
        assert_eq!(card.tags, vec!["Elf".to_string(), "fantasy".to_string()]);
        assert!(card.has_alternate_greetings);
        assert!(!card.has_lorebook);
        assert_eq!(card.primary_file_path.as_deref(), Some(path.as_path()));

        let known = index.known_files(&lib.id).unwrap();
        assert!(known[&path].derived_ready);
        assert_eq!(index.backing_file("c1").unwrap(), Some(path));
    }

    #[test]
    fn test_list_cards_filters() {
        let (index, temp) = create_test_index();
        let lib = index.ensure_library(temp.path()).unwrap();
        add_card(&index, &lib.id, "c1", &parsed("Aria", "An elven archer", &["elf"]), &temp.path().join("a.png"));
        add_card(&index, &lib.id, "c2", &parsed("Bram", "A dwarven smith", &["dwarf"]), &temp.path().join("b.png"));

        let all = index
            .list_cards(&CardQuery { library_id: Some(lib.id.clone()), limit: 10, ..Default::default() }, 3)
            .unwrap();
        assert_eq!(all.total_count, 2);
        assert_eq!(all.revision, 3);
        assert_eq!(all.cards[0].name, "Aria");

        let tagged = index
            .list_cards(&CardQuery { tags: vec!["ELF".to_string()], limit: 10, ..Default::default() }, 0)
            .unwrap();
        assert_eq!(tagged.cards.len(), 1);
        assert_eq!(tagged.cards[0].id, "c1");

        let text = index
            .list_cards(&CardQuery { text: Some("dwarv".to_string()), limit: 10, ..Default::default() }, 0)
            .unwrap();
        assert_eq!(text.total_count, 1);
        assert_eq!(text.cards[0].id, "c2");
    }

    #[test]
    fn test_delete_cascades() {
        let (index, temp) = create_test_index();
        let lib = index.ensure_library(temp.path()).unwrap();
        let path = temp.path().join("a.png");
        add_card(&index, &lib.id, "c1", &parsed("Aria", "x", &["elf"]), &path);

        let removed = index
            .write(|tx| {
                let touched = writes::remove_card_files(tx, &lib.id, &[path.clone()])?;
                assert_eq!(touched, vec!["c1".to_string()]);
                let removed = writes::remove_cards_without_files(tx, &lib.id)?;
                writes::remove_unused_tags(tx)?;
                Ok(removed)
            })
            .unwrap();

        assert_eq!(removed, vec!["c1".to_string()]);
        assert!(index.get_card("c1").unwrap().is_none());
        assert_eq!(index.stats(&lib.id).unwrap(), LibraryStats::default());
        let search = index
            .list_cards(&CardQuery { text: Some("aria".to_string()), limit: 10, ..Default::default() }, 0)
            .unwrap();
        assert!(search.cards.is_empty());
    }

    #[test]
    fn test_duplicate_hash_is_unique_violation() {
        let (index, temp) = create_test_index();
        let lib = index.ensure_library(temp.path()).unwrap();
        let card = parsed("Aria", "x", &[]);
        let now = Utc::now().to_rfc3339();
        let path = temp.path().join("a.png");

        let err = index
            .write(|tx| {
                writes::insert_card(tx, "c1", &lib.id, "same", &card, &path, &now)?;
                writes::insert_card(tx, "c2", &lib.id, "same", &card, &path, &now)?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_unique_violation_on(writes::CARD_HASH_UNIQUE_COLUMNS));
        // The failed transaction rolled back the first insert too.
        assert!(index.get_card("c1").unwrap().is_none());
    }

    #[test]
    fn test_thumbnail_path_and_primary_reset() {
        let (index, temp) = create_test_index();
        let lib = index.ensure_library(temp.path()).unwrap();
        let first = temp.path().join("a.png");
        let second = temp.path().join("b.png");
        add_card(&index, &lib.id, "c1", &parsed("Aria", "x", &[]), &first);

        let now = Utc::now().to_rfc3339();
        let stamp = FileStamp { size: 1, mtime_ms: 5, birthtime_ms: 5 };
        index
            .write(|tx| writes::upsert_card_file(tx, "c1", &lib.id, &second, &stamp, &now))
            .unwrap();

        assert!(index.set_thumbnail_path("c1", Some(Path::new("/t/c1.jpg"))).unwrap());
        assert!(!index.set_thumbnail_path("missing", None).unwrap());

        index
            .write(|tx| {
                writes::remove_card_files(tx, &lib.id, &[first.clone()])?;
                writes::clear_dangling_primary(tx, &lib.id)
            })
            .unwrap();

        let card = index.get_card("c1").unwrap().unwrap();
        assert_eq!(card.primary_file_path, None);
        assert_eq!(card.thumbnail_path, Some(PathBuf::from("/t/c1.jpg")));
        assert_eq!(index.backing_file("c1").unwrap(), Some(second));
    }
}
