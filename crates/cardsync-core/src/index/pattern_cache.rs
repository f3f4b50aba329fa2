//! Pattern rule cache rows and their sparse matches.

use crate::error::{CardSyncError, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::CardIndex;

/// Build state of a cached rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternCacheStatus {
    Building,
    Ready,
    Failed,
}

impl PatternCacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCacheStatus::Building => "building",
            PatternCacheStatus::Ready => "ready",
            PatternCacheStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "building" => Some(PatternCacheStatus::Building),
            "ready" => Some(PatternCacheStatus::Ready),
            "failed" => Some(PatternCacheStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCacheEntry {
    pub rule_set_hash: String,
    pub library_id: String,
    pub status: PatternCacheStatus,
    pub rule_count: usize,
    pub card_count: usize,
    pub match_count: usize,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Rules that matched one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatchRecord {
    pub card_id: String,
    pub rule_ids: Vec<String>,
}

impl CardIndex {
    /// Mark `rule_set_hash` as building for `library_id` and drop its old matches.
    pub fn begin_pattern_run(
        &self,
        rule_set_hash: &str,
        library_id: &str,
        rule_count: usize,
    ) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO pattern_rule_cache (
                    rule_set_hash, library_id, status, rule_count, card_count,
                    match_count, error, started_at, finished_at
                 ) VALUES (?1, ?2, 'building', ?3, 0, 0, NULL, ?4, NULL)
                 ON CONFLICT(rule_set_hash) DO UPDATE SET
                    library_id = excluded.library_id,
                    status = 'building',
                    rule_count = excluded.rule_count,
                    card_count = 0,
                    match_count = 0,
                    error = NULL,
                    started_at = excluded.started_at,
                    finished_at = NULL",
                params![
                    rule_set_hash,
                    library_id,
                    rule_count as i64,
                    Utc::now().to_rfc3339()
                ],
            )?;
            tx.execute(
                "DELETE FROM pattern_matches WHERE rule_set_hash = ?1",
                [rule_set_hash],
            )?;
            Ok(())
        })
    }

    /// Insert every match row in one transaction. Cards deleted since they
    /// were read are skipped. Returns the number of rows written.
    pub fn store_pattern_matches(
        &self,
        rule_set_hash: &str,
        matches: &[PatternMatchRecord],
    ) -> Result<usize> {
        self.write(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO pattern_matches (rule_set_hash, card_id, rule_ids_json)
                 SELECT ?1, ?2, ?3 WHERE EXISTS (SELECT 1 FROM cards WHERE id = ?2)",
            )?;
            let mut written = 0;
            for record in matches {
                written += stmt.execute(params![
                    rule_set_hash,
                    record.card_id,
                    serde_json::to_string(&record.rule_ids)?
                ])?;
            }
            Ok(written)
        })
    }

    pub fn finish_pattern_run(
        &self,
        rule_set_hash: &str,
        card_count: usize,
        match_count: usize,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pattern_rule_cache
             SET status = 'ready', card_count = ?2, match_count = ?3, finished_at = ?4
             WHERE rule_set_hash = ?1",
            params![
                rule_set_hash,
                card_count as i64,
                match_count as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn fail_pattern_run(&self, rule_set_hash: &str, message: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pattern_rule_cache
             SET status = 'failed', error = ?2, finished_at = ?3
             WHERE rule_set_hash = ?1",
            params![rule_set_hash, message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn pattern_status(&self, rule_set_hash: &str) -> Result<Option<PatternCacheEntry>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT rule_set_hash, library_id, status, rule_count, card_count,
                        match_count, error, started_at, finished_at
                 FROM pattern_rule_cache WHERE rule_set_hash = ?1",
                [rule_set_hash],
                Self::row_to_cache_entry,
            )
            .optional()?;
        row.transpose()
    }

    pub fn pattern_matches(&self, rule_set_hash: &str) -> Result<Vec<PatternMatchRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT card_id, rule_ids_json FROM pattern_matches
             WHERE rule_set_hash = ?1 ORDER BY card_id",
        )?;
        let rows = stmt
            .query_map([rule_set_hash], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(card_id, json)| {
                Ok(PatternMatchRecord {
                    card_id,
                    rule_ids: serde_json::from_str(&json)?,
                })
            })
            .collect()
    }

    fn row_to_cache_entry(row: &Row) -> rusqlite::Result<Result<PatternCacheEntry>> {
        let status: String = row.get(2)?;
        let Some(status) = PatternCacheStatus::parse(&status) else {
            return Ok(Err(CardSyncError::Database {
                message: format!("unknown pattern cache status '{status}'"),
                source: None,
            }));
        };
        Ok(Ok(PatternCacheEntry {
            rule_set_hash: row.get(0)?,
            library_id: row.get(1)?,
            status,
            rule_count: row.get::<_, i64>(3)? as usize,
            card_count: row.get::<_, i64>(4)? as usize,
            match_count: row.get::<_, i64>(5)? as usize,
            error: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
        }))
    }
}
