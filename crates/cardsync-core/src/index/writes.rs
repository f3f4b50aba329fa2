//! Statement-level writes used inside scan batch transactions.
//!
//! Every function takes a plain `&Connection` so it composes with the
//! transaction opened by [`CardIndex::write`](super::CardIndex::write).

use crate::error::Result;
use crate::identity::content_hash;
use crate::parser::ParsedCard;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::records::FileStamp;

/// Index named in SQLite's message when two cards in a library share a hash.
pub const CARD_HASH_UNIQUE_COLUMNS: &str = "cards.library_id, cards.content_hash";

pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Card owning `content_hash` in the library, if any.
pub fn find_card_by_hash(
    conn: &Connection,
    library_id: &str,
    content_hash: &str,
) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM cards WHERE library_id = ?1 AND content_hash = ?2",
            params![library_id, content_hash],
            |row| row.get(0),
        )
        .optional()?)
}

/// Number of files backing `card_id` other than `path`.
pub fn other_file_count(conn: &Connection, card_id: &str, path: &Path) -> Result<usize> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM card_files WHERE card_id = ?1 AND path != ?2",
        params![card_id, path_text(path)],
        |row| row.get(0),
    )?)
}

/// Insert a new card.
///
/// Returns the raw SQLite error so the caller can recognise a lost race on
/// the `(library_id, content_hash)` index.
pub fn insert_card(
    conn: &Connection,
    card_id: &str,
    library_id: &str,
    hash: &str,
    card: &ParsedCard,
    primary_file: &Path,
    now: &str,
) -> rusqlite::Result<()> {
    let greetings = serde_json::to_string(&card.alternate_greetings)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO cards (
            id, library_id, content_hash, name, description, personality, scenario,
            first_message, alternate_greetings_json, example_dialogue, creator_notes,
            system_prompt, post_history_instructions, creator, character_version,
            extensions_json, raw_json, schema_version, has_lorebook,
            has_alternate_greetings, has_system_prompt, lorebook_hash, search_text,
            primary_file_path, thumbnail_path, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, NULL, ?25, ?25
        )",
        params![
            card_id,
            library_id,
            hash,
            card.name,
            card.description,
            card.personality,
            card.scenario,
            card.first_message,
            greetings,
            card.example_dialogue,
            card.creator_notes,
            card.system_prompt,
            card.post_history_instructions,
            card.creator,
            card.character_version,
            card.extensions.to_string(),
            card.raw.to_string(),
            card.schema.as_str(),
            card.lorebook.is_some(),
            !card.alternate_greetings.is_empty(),
            !card.system_prompt.is_empty(),
            card.lorebook.as_ref().map(content_hash),
            card.search_text(),
            path_text(primary_file),
            now,
        ],
    )?;
    Ok(())
}

/// Rewrite a card's content in place, keeping its id.
pub fn update_card(
    conn: &Connection,
    card_id: &str,
    hash: &str,
    card: &ParsedCard,
    now: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE cards SET
            content_hash = ?2, name = ?3, description = ?4, personality = ?5,
            scenario = ?6, first_message = ?7, alternate_greetings_json = ?8,
            example_dialogue = ?9, creator_notes = ?10, system_prompt = ?11,
            post_history_instructions = ?12, creator = ?13, character_version = ?14,
            extensions_json = ?15, raw_json = ?16, schema_version = ?17,
            has_lorebook = ?18, has_alternate_greetings = ?19, has_system_prompt = ?20,
            lorebook_hash = ?21, search_text = ?22, updated_at = ?23
         WHERE id = ?1",
        params![
            card_id,
            hash,
            card.name,
            card.description,
            card.personality,
            card.scenario,
            card.first_message,
            serde_json::to_string(&card.alternate_greetings)?,
            card.example_dialogue,
            card.creator_notes,
            card.system_prompt,
            card.post_history_instructions,
            card.creator,
            card.character_version,
            card.extensions.to_string(),
            card.raw.to_string(),
            card.schema.as_str(),
            card.lorebook.is_some(),
            !card.alternate_greetings.is_empty(),
            !card.system_prompt.is_empty(),
            card.lorebook.as_ref().map(content_hash),
            card.search_text(),
            now,
        ],
    )?;
    Ok(())
}

/// Point `path` at `card_id`, inserting or refreshing its stamp.
pub fn upsert_card_file(
    conn: &Connection,
    card_id: &str,
    library_id: &str,
    path: &Path,
    stamp: &FileStamp,
    now: &str,
) -> Result<()> {
    let folder = path.parent().map(path_text).unwrap_or_default();
    conn.execute(
        "INSERT INTO card_files (
            card_id, library_id, path, folder, size, mtime_ms, birthtime_ms, indexed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(path) DO UPDATE SET
            card_id = excluded.card_id,
            library_id = excluded.library_id,
            folder = excluded.folder,
            size = excluded.size,
            mtime_ms = excluded.mtime_ms,
            birthtime_ms = excluded.birthtime_ms,
            indexed_at = excluded.indexed_at",
        params![
            card_id,
            library_id,
            path_text(path),
            folder,
            stamp.size as i64,
            stamp.mtime_ms,
            stamp.birthtime_ms,
            now,
        ],
    )?;
    Ok(())
}

/// Give a card a primary file when it has none.
pub fn set_primary_if_unset(conn: &Connection, card_id: &str, path: &Path) -> Result<()> {
    conn.execute(
        "UPDATE cards SET primary_file_path = ?2
         WHERE id = ?1 AND primary_file_path IS NULL",
        params![card_id, path_text(path)],
    )?;
    Ok(())
}

/// Replace every tag link of a card.
pub fn replace_card_tags(conn: &Connection, card_id: &str, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM card_tags WHERE card_id = ?1", [card_id])?;

    let mut insert_tag = conn.prepare_cached("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
    let mut find_tag = conn.prepare_cached("SELECT id FROM tags WHERE name = ?1")?;
    let mut link = conn
        .prepare_cached("INSERT OR IGNORE INTO card_tags (card_id, tag_id) VALUES (?1, ?2)")?;

    for tag in tags {
        insert_tag.execute([tag])?;
        let tag_id: i64 = find_tag.query_row([tag], |row| row.get(0))?;
        link.execute(params![card_id, tag_id])?;
    }
    Ok(())
}

/// Delete the given file rows; returns the distinct cards they belonged to.
pub fn remove_card_files(
    conn: &Connection,
    library_id: &str,
    paths: &[PathBuf],
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "DELETE FROM card_files WHERE library_id = ?1 AND path = ?2 RETURNING card_id",
    )?;
    let mut touched = Vec::new();
    for path in paths {
        let card_id: Option<String> = stmt
            .query_row(params![library_id, path_text(path)], |row| row.get(0))
            .optional()?;
        if let Some(card_id) = card_id {
            if !touched.contains(&card_id) {
                touched.push(card_id);
            }
        }
    }
    Ok(touched)
}

/// Delete every card in the library with no backing file.
pub fn remove_cards_without_files(conn: &Connection, library_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "DELETE FROM cards
         WHERE library_id = ?1
           AND NOT EXISTS (SELECT 1 FROM card_files f WHERE f.card_id = cards.id)
         RETURNING id",
    )?;
    let ids = stmt
        .query_map([library_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Clear primary-file references whose file row is gone.
pub fn clear_dangling_primary(conn: &Connection, library_id: &str) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE cards SET primary_file_path = NULL
         WHERE library_id = ?1
           AND primary_file_path IS NOT NULL
           AND NOT EXISTS (
               SELECT 1 FROM card_files f
               WHERE f.card_id = cards.id AND f.path = cards.primary_file_path
           )",
        [library_id],
    )?)
}

/// Drop tags no card links to.
pub fn remove_unused_tags(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM tags WHERE NOT EXISTS (SELECT 1 FROM card_tags ct WHERE ct.tag_id = tags.id)",
        [],
    )?)
}
