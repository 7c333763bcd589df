//! Invoice and review-history repository functions.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::ProcessingState;
use crate::models::invoice::Invoice;
use crate::review::ReviewHistoryEntry;

// ═══════════════════════════════════════════
// Invoices
// ═══════════════════════════════════════════

pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(invoice)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO invoices (id, invoice_number, vendor_name, total_amount,
         extraction_confidence, processing_state, review_version, source_error,
         payload, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            invoice.id.to_string(),
            invoice.invoice_number,
            invoice.vendor_name,
            invoice.total_amount.as_ref().map(|m| m.to_string()),
            invoice.extraction_confidence,
            invoice.processing_state.as_str(),
            invoice.review_version,
            invoice.source_error,
            payload,
            invoice.created_at.to_string(),
            invoice.updated_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_invoice(conn: &Connection, id: &Uuid) -> Result<Option<Invoice>, DatabaseError> {
    let row: Option<(String, String, i64)> = conn
        .query_row(
            "SELECT payload, processing_state, review_version FROM invoices WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((payload, state, review_version)) = row else {
        return Ok(None);
    };

    let mut invoice: Invoice = serde_json::from_str(&payload)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    // Columns are authoritative for the concurrency-sensitive pair.
    invoice.processing_state =
        ProcessingState::from_str(&state).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "processing_state".into(),
            value: state,
        })?;
    invoice.review_version = review_version;
    Ok(Some(invoice))
}

pub fn list_invoices_by_state(
    conn: &Connection,
    state: ProcessingState,
) -> Result<Vec<Invoice>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT payload, processing_state, review_version FROM invoices
         WHERE processing_state = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map(params![state.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut invoices = Vec::new();
    for row in rows {
        let (payload, state_str, review_version) = row?;
        let mut invoice: Invoice = serde_json::from_str(&payload)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        invoice.processing_state =
            ProcessingState::from_str(&state_str).ok_or_else(|| DatabaseError::InvalidEnum {
                field: "processing_state".into(),
                value: state_str,
            })?;
        invoice.review_version = review_version;
        invoices.push(invoice);
    }
    Ok(invoices)
}

// ═══════════════════════════════════════════
// Review history
// ═══════════════════════════════════════════

pub fn insert_review_history(
    conn: &Connection,
    entry: &ReviewHistoryEntry,
) -> Result<(), DatabaseError> {
    let fields_changed = serde_json::to_string(&entry.fields_changed)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO review_history (invoice_id, review_version, reviewer,
         previous_state, new_state, fields_changed, validation_notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.invoice_id.to_string(),
            entry.review_version,
            entry.reviewer,
            entry.previous_state.as_str(),
            entry.new_state.as_str(),
            fields_changed,
            entry.validation_notes,
            entry.created_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn list_review_history(
    conn: &Connection,
    invoice_id: &Uuid,
) -> Result<Vec<ReviewHistoryEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT invoice_id, review_version, reviewer, previous_state, new_state,
         fields_changed, validation_notes, created_at
         FROM review_history WHERE invoice_id = ?1 ORDER BY review_version",
    )?;
    let rows = stmt.query_map(params![invoice_id.to_string()], |row| {
        Ok(HistoryRow {
            invoice_id: row.get(0)?,
            review_version: row.get(1)?,
            reviewer: row.get(2)?,
            previous_state: row.get(3)?,
            new_state: row.get(4)?,
            fields_changed: row.get(5)?,
            validation_notes: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(history_from_row(row?)?);
    }
    Ok(entries)
}

struct HistoryRow {
    invoice_id: String,
    review_version: i64,
    reviewer: Option<String>,
    previous_state: String,
    new_state: String,
    fields_changed: String,
    validation_notes: Option<String>,
    created_at: String,
}

fn history_from_row(row: HistoryRow) -> Result<ReviewHistoryEntry, DatabaseError> {
    let parse_state = |value: String| {
        ProcessingState::from_str(&value).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "processing_state".into(),
            value,
        })
    };
    Ok(ReviewHistoryEntry {
        invoice_id: Uuid::parse_str(&row.invoice_id).map_err(|e| {
            DatabaseError::Serialization(format!("invalid invoice id: {e}"))
        })?,
        review_version: row.review_version,
        reviewer: row.reviewer,
        previous_state: parse_state(row.previous_state)?,
        new_state: parse_state(row.new_state)?,
        fields_changed: serde_json::from_str(&row.fields_changed)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        validation_notes: row.validation_notes,
        created_at: chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%dT%H:%M:%S%.f")
            })
            .map_err(|e| {
                DatabaseError::Serialization(format!(
                    "invalid created_at {:?}: {e}",
                    row.created_at
                ))
            })?,
    })
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
