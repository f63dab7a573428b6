use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::parser::records::ContactRecord;
use crate::report::{Report, RunStats};

pub const DEFAULT_DB_PATH: &str = "data/contacts.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id                  INTEGER PRIMARY KEY,
            started_at          TEXT NOT NULL,
            finished_at         TEXT NOT NULL DEFAULT (datetime('now')),
            input               TEXT NOT NULL,
            total_extracted     INTEGER NOT NULL,
            unique_count        INTEGER NOT NULL,
            duplicates_removed  INTEGER NOT NULL,
            pages_processed     INTEGER NOT NULL,
            pages_failed        INTEGER NOT NULL,
            rejected_candidates INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS run_pages (
            id       INTEGER PRIMARY KEY,
            run_id   INTEGER NOT NULL REFERENCES runs(id),
            source   TEXT NOT NULL,
            ok       BOOLEAN NOT NULL,
            error    TEXT,
            records  INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_run_pages_run ON run_pages(run_id);

        CREATE TABLE IF NOT EXISTS contacts (
            id      INTEGER PRIMARY KEY,
            run_id  INTEGER NOT NULL REFERENCES runs(id),
            name    TEXT,
            email   TEXT,
            phone   TEXT,
            source  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_contacts_run ON contacts(run_id);
        CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);
        ",
    )?;
    Ok(())
}

/// Store a finished run with its pages and unique contacts. Returns the run id.
pub fn save_run(
    conn: &Connection,
    started_at: DateTime<Utc>,
    input: &str,
    report: &Report,
) -> Result<i64> {
    let s = &report.stats;
    let tx = conn.unchecked_transaction()?;
    let run_id;
    {
        tx.execute(
            "INSERT INTO runs
             (started_at, finished_at, input, total_extracted, unique_count, duplicates_removed,
              pages_processed, pages_failed, rejected_candidates)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                started_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                input,
                s.total_extracted as i64,
                s.unique_count as i64,
                s.duplicates_removed as i64,
                s.pages_processed as i64,
                s.pages_failed as i64,
                s.rejected_candidates as i64,
            ],
        )?;
        run_id = tx.last_insert_rowid();

        let mut page_stmt = tx.prepare(
            "INSERT INTO run_pages (run_id, source, ok, error, records) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for p in &report.pages {
            page_stmt.execute(rusqlite::params![
                run_id,
                p.source,
                p.error.is_none(),
                p.error,
                p.records as i64,
            ])?;
        }

        let mut contact_stmt = tx.prepare(
            "INSERT INTO contacts (run_id, name, email, phone, source) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in &report.records {
            contact_stmt.execute(rusqlite::params![run_id, r.name, r.email, r.phone, r.source])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

pub struct RunRow {
    pub id: i64,
    pub started_at: String,
    pub input: String,
    pub stats: RunStats,
}

/// Most recent runs first.
pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let sql = format!(
        "SELECT id, started_at, input, total_extracted, unique_count, duplicates_removed,
                pages_processed, pages_failed, rejected_candidates
         FROM runs
         ORDER BY id DESC
         LIMIT {}",
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                started_at: row.get(1)?,
                input: row.get(2)?,
                stats: RunStats {
                    total_extracted: row.get(3)?,
                    unique_count: row.get(4)?,
                    duplicates_removed: row.get(5)?,
                    pages_processed: row.get(6)?,
                    pages_failed: row.get(7)?,
                    rejected_candidates: row.get(8)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_contacts(conn: &Connection, run_id: i64) -> Result<Vec<ContactRecord>> {
    let mut stmt = conn.prepare(
        "SELECT name, email, phone, source FROM contacts WHERE run_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([run_id], |row| {
            Ok(ContactRecord {
                name: row.get(0)?,
                email: row.get(1)?,
                phone: row.get(2)?,
                source: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Failed pages of a run as (source, error).
pub fn fetch_failed_pages(conn: &Connection, run_id: i64) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT source, COALESCE(error, '') FROM run_pages
         WHERE run_id = ?1 AND ok = 0
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Tests ──
