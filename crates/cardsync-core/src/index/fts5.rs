//! FTS5 virtual table over card text.

use crate::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Configuration for the card search table.
#[derive(Debug, Clone)]
pub struct FTS5Config {
    /// Name of the FTS5 virtual table.
    pub table_name: String,
    /// Tokenizer configuration.
    pub tokenizer: String,
}

impl Default for FTS5Config {
    fn default() -> Self {
        Self {
            table_name: "card_search".to_string(),
            tokenizer: "unicode61 remove_diacritics 2".to_string(),
        }
    }
}

/// Creates and maintains the search table and the triggers that mirror
/// `cards` into it.
pub struct FTS5Manager<'a> {
    config: &'a FTS5Config,
}

impl<'a> FTS5Manager<'a> {
    pub fn new(config: &'a FTS5Config) -> Self {
        Self { config }
    }

    fn object_exists(&self, conn: &Connection, kind: &str, name: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
            [kind, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        self.object_exists(conn, "table", &self.config.table_name)
    }

    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let table = &self.config.table_name;
        for suffix in ["ai", "au", "ad"] {
            if !self.object_exists(conn, "trigger", &format!("{table}_{suffix}"))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Create whatever is missing, repopulating when the table or its
    /// triggers were absent.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        let had_table = self.table_exists(conn)?;
        let had_triggers = had_table && self.triggers_exist(conn)?;

        if !had_table {
            self.create_table(conn)?;
        }
        self.create_triggers(conn)?;
        if !had_triggers {
            self.populate_from_cards(conn)?;
        }
        Ok(())
    }

    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                id UNINDEXED,
                name,
                creator,
                search_text,
                tokenize='{}'
            );",
            self.config.table_name, self.config.tokenizer
        ))?;
        info!("Created FTS5 table: {}", self.config.table_name);
        Ok(())
    }

    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;

        conn.execute_batch(&format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ai AFTER INSERT ON cards BEGIN
                INSERT INTO {table} (id, name, creator, search_text)
                VALUES (NEW.id, NEW.name, NEW.creator, COALESCE(NEW.search_text, ''));
            END;

            CREATE TRIGGER IF NOT EXISTS {table}_au
            AFTER UPDATE OF name, creator, search_text ON cards BEGIN
                DELETE FROM {table} WHERE id = OLD.id;
                INSERT INTO {table} (id, name, creator, search_text)
                VALUES (NEW.id, NEW.name, NEW.creator, COALESCE(NEW.search_text, ''));
            END;

            CREATE TRIGGER IF NOT EXISTS {table}_ad AFTER DELETE ON cards BEGIN
                DELETE FROM {table} WHERE id = OLD.id;
            END;"
        ))?;

        debug!("Created FTS5 triggers for {}", table);
        Ok(())
    }

    pub fn populate_from_cards(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;
        conn.execute_batch(&format!(
            "DELETE FROM {table};
             INSERT INTO {table} (id, name, creator, search_text)
             SELECT id, name, creator, COALESCE(search_text, '') FROM cards;"
        ))?;
        info!("Populated {} from cards", table);
        Ok(())
    }

    /// Drop and recreate the table and triggers, then repopulate.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;
        conn.execute_batch(&format!(
            "DROP TRIGGER IF EXISTS {table}_ai;
             DROP TRIGGER IF EXISTS {table}_au;
             DROP TRIGGER IF EXISTS {table}_ad;
             DROP TABLE IF EXISTS {table};"
        ))?;

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate_from_cards(conn)?;

        info!("Rebuilt FTS5 index {}", table);
        Ok(())
    }
}
