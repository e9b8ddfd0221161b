/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for the terminology store and the
 * durable cache tier, abstracting away the SQL details.
 */

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::connection::DatabaseConnection;
use crate::translation::cache::CacheEntry;
use crate::translation::glossary::GlossaryEntry;

/// Durable cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurableCacheStats {
    /// Rows in the table, expired ones included
    pub total_entries: i64,
    /// Rows that are still live
    pub live_entries: i64,
    /// Sum of hit counts
    pub total_hits: i64,
}

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_glossary_row(row: &Row) -> rusqlite::Result<GlossaryEntry> {
    Ok(GlossaryEntry {
        source_term: row.get(0)?,
        target_term: row.get(1)?,
        source_lang: row.get(2)?,
        target_lang: row.get(3)?,
        domain: row.get(4)?,
        priority: row.get(5)?,
    })
}

fn parse_cache_row(row: &Row) -> rusqlite::Result<CacheEntry> {
    let ttl_secs: i64 = row.get(3)?;
    let hit_count: i64 = row.get(4)?;
    Ok(CacheEntry {
        fingerprint: row.get(0)?,
        translated_text: row.get(1)?,
        created_at: parse_timestamp(2, row.get(2)?)?,
        ttl_secs: ttl_secs.max(0) as u64,
        hit_count: hit_count.max(0) as u64,
    })
}

const CACHE_COLUMNS: &str = "fingerprint, translated_text, created_at, ttl_secs, hit_count";

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Glossary Operations
    // =========================================================================

    /// Insert a glossary entry, or update its target term and keep the higher priority
    pub async fn upsert_glossary_entry(&self, entry: GlossaryEntry) -> Result<()> {
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO glossary_entries (
                        source_term, target_term, source_lang, target_lang, domain, priority, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(source_term, source_lang, target_lang, domain)
                    DO UPDATE SET
                        target_term = excluded.target_term,
                        priority = MAX(glossary_entries.priority, excluded.priority)
                    "#,
                    params![
                        entry.source_term,
                        entry.target_term,
                        entry.source_lang,
                        entry.target_lang,
                        entry.domain,
                        entry.priority,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Entries for one source language and domain
    pub async fn lookup_glossary_terms(&self, lang: String, domain: String) -> Result<Vec<GlossaryEntry>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT source_term, target_term, source_lang, target_lang, domain, priority
                    FROM glossary_entries
                    WHERE source_lang = ?1 AND domain = ?2
                    ORDER BY id
                    "#,
                )?;
                let entries = stmt
                    .query_map(params![lang, domain], parse_glossary_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await
    }

    /// Every entry, optionally restricted to one source language
    pub async fn list_glossary_entries(&self, lang: Option<String>) -> Result<Vec<GlossaryEntry>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT source_term, target_term, source_lang, target_lang, domain, priority
                    FROM glossary_entries
                    WHERE ?1 IS NULL OR source_lang = ?1
                    ORDER BY source_lang, domain, source_term
                    "#,
                )?;
                let entries = stmt
                    .query_map(params![lang], parse_glossary_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await
    }

    // =========================================================================
    // Cache Operations
    // =========================================================================

    /// Live cache entry for `fingerprint`; bumps its hit count
    pub async fn get_cache_entry(&self, fingerprint: String, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        self.db
            .execute_async(move |conn| {
                let entry = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM cache_entries WHERE fingerprint = ?1 AND expires_at > ?2",
                            CACHE_COLUMNS
                        ),
                        params![fingerprint, now.timestamp()],
                        parse_cache_row,
                    )
                    .optional()?;

                match entry {
                    Some(mut entry) => {
                        conn.execute(
                            "UPDATE cache_entries SET hit_count = hit_count + 1 WHERE fingerprint = ?1",
                            [&entry.fingerprint],
                        )?;
                        entry.hit_count += 1;
                        debug!("Durable cache hit for {}", &entry.fingerprint[..entry.fingerprint.len().min(12)]);
                        Ok(Some(entry))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    /// Store `entry` unless a live row already holds the fingerprint; returns the stored row
    pub async fn put_cache_entry_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry> {
        self.db
            .transaction_async(move |tx| {
                let now = Utc::now().timestamp();
                tx.execute(
                    "DELETE FROM cache_entries WHERE fingerprint = ?1 AND expires_at <= ?2",
                    params![entry.fingerprint, now],
                )?;
                tx.execute(
                    r#"
                    INSERT INTO cache_entries (fingerprint, translated_text, created_at, expires_at, ttl_secs, hit_count)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(fingerprint) DO NOTHING
                    "#,
                    params![
                        entry.fingerprint,
                        entry.translated_text,
                        entry.created_at.to_rfc3339(),
                        entry.expires_at().timestamp(),
                        entry.ttl_secs as i64,
                        entry.hit_count as i64,
                    ],
                )?;
                let stored = tx.query_row(
                    &format!("SELECT {} FROM cache_entries WHERE fingerprint = ?1", CACHE_COLUMNS),
                    [&entry.fingerprint],
                    parse_cache_row,
                )?;
                Ok(stored)
            })
            .await
    }

    /// Delete expired cache rows; returns how many were removed
    pub async fn purge_expired_cache_entries(&self, now: DateTime<Utc>) -> Result<usize> {
        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", [now.timestamp()])?;
                Ok(deleted)
            })
            .await
    }

    /// Get cache statistics
    pub async fn cache_stats(&self) -> Result<DurableCacheStats> {
        self.db
            .execute_async(|conn| {
                let now = Utc::now().timestamp();
                let (total_entries, total_hits): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM cache_entries",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                let live_entries: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
                    [now],
                    |row| row.get(0),
                )?;
                Ok(DurableCacheStats {
                    total_entries,
                    live_entries,
                    total_hits,
                })
            })
            .await
    }
}
