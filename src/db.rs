use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::error::Result;

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS publications (
            scholar_id  TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            venue       TEXT,
            year        INTEGER,
            url         TEXT,
            citations   INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

/// Whole-collection view of the publication dataset, keyed by Scholar work id.
///
/// Reconciliation only ever touches `citations`; descriptive fields belong to
/// whoever maintains the dataset (see [`import_publications`]).
pub trait WorkStore {
    fn load_citations(&self) -> Result<BTreeMap<String, u64>>;

    /// Write every entry back in one transaction. Ids not in the store are ignored.
    fn save_citations(&self, citations: &BTreeMap<String, u64>) -> Result<()>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        SqliteStore::from_connection(connect(path)?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl WorkStore for SqliteStore {
    fn load_citations(&self) -> Result<BTreeMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT scholar_id, citations FROM publications")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(rows)
    }

    fn save_citations(&self, citations: &BTreeMap<String, u64>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE publications SET citations = ?2, updated_at = datetime('now')
                 WHERE scholar_id = ?1 AND citations != ?2",
            )?;
            for (scholar_id, count) in citations {
                stmt.execute(params![scholar_id, count])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ── Dataset import ──

/// One publication as the dataset maintainer writes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationImport {
    pub scholar_id: String,
    pub title: String,
    #[serde(default)]
    pub publication: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    /// Omitted counts keep whatever the store already has.
    #[serde(default)]
    pub citations: Option<u64>,
}

pub fn import_publications(conn: &Connection, rows: &[PublicationImport]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO publications (scholar_id, title, venue, year, url, citations)
             VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 0))
             ON CONFLICT(scholar_id) DO UPDATE SET
                title = excluded.title,
                venue = excluded.venue,
                year = excluded.year,
                url = excluded.url,
                citations = COALESCE(?6, publications.citations)",
        )?;
        for r in rows {
            count += stmt.execute(params![
                r.scholar_id,
                r.title,
                r.publication,
                r.year,
                r.url,
                r.citations,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}
