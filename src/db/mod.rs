//! SQLite persistence.
//!
//! The invoice row carries the columns the service queries and filters on;
//! the full canonical record travels as a JSON payload column so the schema
//! never chases the field vocabulary. `review_version` and `processing_state`
//! live both in columns (for the compare-and-swap and for listing) and in the
//! payload; the repository keeps them in sync on every write.

pub mod repository;

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Payload serialization failed: {0}")]
    Serialization(String),
}

/// Open (or create) the database file and ensure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create tables and indexes. Idempotent.
pub fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            invoice_number TEXT,
            vendor_name TEXT,
            total_amount TEXT,
            extraction_confidence REAL NOT NULL,
            processing_state TEXT NOT NULL,
            review_version INTEGER NOT NULL DEFAULT 0,
            source_error TEXT,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_invoices_state
            ON invoices(processing_state);
        CREATE INDEX IF NOT EXISTS idx_invoices_number
            ON invoices(invoice_number);

        CREATE TABLE IF NOT EXISTS review_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id TEXT NOT NULL REFERENCES invoices(id),
            review_version INTEGER NOT NULL,
            reviewer TEXT,
            previous_state TEXT NOT NULL,
            new_state TEXT NOT NULL,
            fields_changed TEXT NOT NULL,
            validation_notes TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_review_history_invoice
            ON review_history(invoice_id);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('invoices', 'review_history')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn open_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factura.db");
        let conn = open_database(&path).unwrap();
        conn.execute(
            "INSERT INTO invoices (id, extraction_confidence, processing_state,
             review_version, payload, created_at, updated_at)
             VALUES ('x', 0.0, 'extracted', 0, '{}', '', '')",
            [],
        )
        .unwrap();
        assert!(path.exists());
    }
}
