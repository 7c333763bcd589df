//! Human review of extracted invoices, guarded by optimistic concurrency.
//!
//! Every invoice row carries a `review_version`. A submission names the
//! version it was based on; the write is a compare-and-swap on that column
//! inside a single transaction, so two reviewers editing the same record
//! cannot silently overwrite each other — the loser gets a conflict carrying
//! the current version and re-fetches. Accepted submissions bump the version
//! by exactly one and append a history entry; any failure rolls the whole
//! transaction back.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::ProcessingState;
use crate::models::invoice::Invoice;
use crate::pipeline::mapper::parse::parse_decimal;

/// Confidence assigned to a field a human has confirmed or corrected.
const REVIEWED_CONFIDENCE: f32 = 1.0;

// ═══════════════════════════════════════════════════════════
// Submission types
// ═══════════════════════════════════════════════════════════

/// One reviewed field: a correction when `corrected_value` is set, a bare
/// confirmation otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValidation {
    pub field_name: String,
    #[serde(default)]
    pub corrected_value: Option<String>,
}

/// One reviewed line item, addressed by its current line number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItemValidation {
    pub line_number: u32,
    #[serde(default)]
    pub corrected_description: Option<String>,
    #[serde(default)]
    pub corrected_quantity: Option<String>,
    #[serde(default)]
    pub corrected_unit_price: Option<String>,
    #[serde(default)]
    pub corrected_amount: Option<String>,
    #[serde(default)]
    pub delete: bool,
}

/// A complete review submission against one invoice version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSubmission {
    pub invoice_id: Uuid,
    /// The review_version this submission was prepared against.
    pub expected_review_version: i64,
    #[serde(default)]
    pub field_validations: Vec<FieldValidation>,
    #[serde(default)]
    pub line_item_validations: Vec<LineItemValidation>,
    /// Target state for the invoice after this submission.
    pub overall_status: ProcessingState,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub validation_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewAccepted {
    pub invoice_id: Uuid,
    /// The version after the accepted write.
    pub review_version: i64,
}

/// One accepted submission, as recorded in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewHistoryEntry {
    pub invoice_id: Uuid,
    pub review_version: i64,
    pub reviewer: Option<String>,
    pub previous_state: ProcessingState,
    pub new_state: ProcessingState,
    pub fields_changed: Vec<String>,
    pub validation_notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Invoice {0} not found")]
    NotFound(Uuid),
    #[error("Stale write on invoice {invoice_id}: current review version is {current_review_version}")]
    Conflict {
        invoice_id: Uuid,
        current_review_version: i64,
    },
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Submission
// ═══════════════════════════════════════════════════════════

/// Apply one review submission.
///
/// Runs in a single transaction: load, validate the state transition, apply
/// corrections, compare-and-swap on `review_version`, append history, commit.
/// A version mismatch surfaces as `Conflict` with the current version and
/// leaves the record untouched.
pub fn submit(
    conn: &mut Connection,
    submission: &ValidationSubmission,
    default_currency: &str,
) -> Result<ReviewAccepted, ReviewError> {
    let tx = conn.transaction().map_err(DatabaseError::from)?;

    let mut invoice = repository::get_invoice(&tx, &submission.invoice_id)?
        .ok_or(ReviewError::NotFound(submission.invoice_id))?;

    // Fail fast on a version the caller has already lost; the UPDATE below
    // re-checks under the write lock.
    if invoice.review_version != submission.expected_review_version {
        return Err(ReviewError::Conflict {
            invoice_id: submission.invoice_id,
            current_review_version: invoice.review_version,
        });
    }

    if !invoice
        .processing_state
        .can_transition_to(submission.overall_status)
    {
        return Err(ReviewError::InvalidTransition {
            from: invoice.processing_state.as_str().to_string(),
            to: submission.overall_status.as_str().to_string(),
        });
    }

    let previous_state = invoice.processing_state;
    let fields_changed = apply_corrections(&mut invoice, submission, default_currency);

    invoice.processing_state = submission.overall_status;
    invoice.review_version += 1;
    invoice.updated_at = Utc::now().naive_utc();

    let payload = serde_json::to_string(&invoice)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let updated = tx
        .execute(
            "UPDATE invoices SET invoice_number = ?3, vendor_name = ?4, total_amount = ?5,
             extraction_confidence = ?6, processing_state = ?7, review_version = ?8,
             payload = ?9, updated_at = ?10
             WHERE id = ?1 AND review_version = ?2",
            params![
                invoice.id.to_string(),
                submission.expected_review_version,
                invoice.invoice_number,
                invoice.vendor_name,
                invoice.total_amount.as_ref().map(|m| m.to_string()),
                invoice.extraction_confidence,
                invoice.processing_state.as_str(),
                invoice.review_version,
                payload,
                invoice.updated_at.to_string(),
            ],
        )
        .map_err(DatabaseError::from)?;

    if updated == 0 {
        let current: i64 = tx
            .query_row(
                "SELECT review_version FROM invoices WHERE id = ?1",
                params![invoice.id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::from)?
            .ok_or(ReviewError::NotFound(submission.invoice_id))?;
        // Transaction drops here, rolling back.
        return Err(ReviewError::Conflict {
            invoice_id: submission.invoice_id,
            current_review_version: current,
        });
    }

    let entry = ReviewHistoryEntry {
        invoice_id: invoice.id,
        review_version: invoice.review_version,
        reviewer: submission.reviewer.clone(),
        previous_state,
        new_state: invoice.processing_state,
        fields_changed,
        validation_notes: submission.validation_notes.clone(),
        created_at: invoice.updated_at,
    };
    repository::insert_review_history(&tx, &entry)?;

    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        invoice_id = %invoice.id,
        review_version = invoice.review_version,
        state = invoice.processing_state.as_str(),
        "Review submission accepted"
    );
    Ok(ReviewAccepted {
        invoice_id: invoice.id,
        review_version: invoice.review_version,
    })
}

/// Apply field and line-item corrections. Values the field's type rejects
/// are skipped; confirmed or corrected fields get full confidence.
fn apply_corrections(
    invoice: &mut Invoice,
    submission: &ValidationSubmission,
    default_currency: &str,
) -> Vec<String> {
    let mut changed = Vec::new();

    for validation in &submission.field_validations {
        match &validation.corrected_value {
            Some(value) => {
                if invoice.set_field(&validation.field_name, value, default_currency) {
                    invoice
                        .field_confidence
                        .insert(validation.field_name.clone(), REVIEWED_CONFIDENCE);
                    changed.push(validation.field_name.clone());
                } else {
                    tracing::warn!(
                        field = %validation.field_name,
                        "Review correction rejected by field type"
                    );
                }
            }
            // Bare confirmation: value stands, confidence becomes certain.
            None => {
                if !invoice.field_is_blank(&validation.field_name) {
                    invoice
                        .field_confidence
                        .insert(validation.field_name.clone(), REVIEWED_CONFIDENCE);
                }
            }
        }
    }

    for validation in &submission.line_item_validations {
        if validation.delete {
            let before = invoice.line_items.len();
            invoice
                .line_items
                .retain(|item| item.line_number != validation.line_number);
            if invoice.line_items.len() != before {
                changed.push(format!("line_item:{}", validation.line_number));
            }
            continue;
        }

        if let Some(item) = invoice
            .line_items
            .iter_mut()
            .find(|item| item.line_number == validation.line_number)
        {
            let mut touched = false;
            if let Some(desc) = &validation.corrected_description {
                item.description = Some(desc.clone());
                touched = true;
            }
            if let Some(q) = validation
                .corrected_quantity
                .as_deref()
                .and_then(parse_decimal)
            {
                item.quantity = Some(q);
                touched = true;
            }
            if let Some(p) = validation
                .corrected_unit_price
                .as_deref()
                .and_then(parse_decimal)
            {
                item.unit_price = Some(p);
                touched = true;
            }
            if let Some(a) = validation
                .corrected_amount
                .as_deref()
                .and_then(parse_decimal)
            {
                item.amount = Some(a);
                touched = true;
            }
            if touched {
                item.confidence = REVIEWED_CONFIDENCE;
                changed.push(format!("line_item:{}", validation.line_number));
            }
        }
    }

    // Deletions leave gaps; numbering stays 1..n.
    for (index, item) in invoice.line_items.iter_mut().enumerate() {
        item.line_number = (index + 1) as u32;
    }

    changed
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
