//! Catalog schema migrations.
//!
//! Each step is an embedded SQL script tagged with a version. Applied
//! versions are recorded in `schema_migrations`, and every pending step
//! runs in its own transaction so a failed script leaves the catalog at
//! the last good version.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Catalog migration {version} ({name}) failed: {reason}")]
    Failed {
        version: usize,
        name: &'static str,
        reason: String,
    },
}

struct Step {
    version: usize,
    name: &'static str,
    sql: &'static str,
}

impl Step {
    fn failed(&self, e: rusqlite::Error) -> MigrationError {
        MigrationError::Failed {
            version: self.version,
            name: self.name,
            reason: e.to_string(),
        }
    }
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "initial",
        sql: include_str!("001_initial.sql"),
    },
    Step {
        version: 2,
        name: "attachment_lookup",
        sql: include_str!("002_attachment_lookup.sql"),
    },
];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

/// Highest applied version, creating the version table on first use.
pub fn current_version(conn: &Connection) -> Result<usize, MigrationError> {
    conn.execute(VERSION_TABLE, [])?;
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<usize>>(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Version the catalog ends up at once every step has run.
pub fn latest_version() -> usize {
    STEPS.last().map(|s| s.version).unwrap_or(0)
}

/// Apply every step newer than the catalog's version.
///
/// Returns the number of steps applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    let from = current_version(conn)?;

    let mut applied = 0;
    for step in STEPS.iter().filter(|s| s.version > from) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(step.sql).map_err(|e| step.failed(e))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![step.version, step.name],
        )
        .map_err(|e| step.failed(e))?;
        tx.commit().map_err(|e| step.failed(e))?;

        tracing::info!(version = step.version, name = step.name, "Applied catalog migration");
        applied += 1;
    }

    if applied > 0 {
        tracing::debug!(from, to = latest_version(), "Catalog schema up to date");
    }
    Ok(applied)
}
