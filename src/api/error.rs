//! HTTP error mapping.
//!
//! Every error leaves as a JSON body with a stable `error_code` the review
//! UI can branch on. Stale writes carry the current review version so the
//! client can re-fetch and rebase without a second round trip.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::review::ReviewError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    StaleWrite {
        invoice_id: Uuid,
        current_review_version: i64,
    },
    InvalidTransition {
        from: String,
        to: String,
    },
    BadRequest(String),
    Internal(String),
}

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::NotFound(id) => ApiError::NotFound(format!("Invoice {id} not found")),
            ReviewError::Conflict {
                invoice_id,
                current_review_version,
            } => ApiError::StaleWrite {
                invoice_id,
                current_review_version,
            },
            ReviewError::InvalidTransition { from, to } => {
                ApiError::InvalidTransition { from, to }
            }
            ReviewError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} {id} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({"error_code": "NOT_FOUND", "message": message}),
            ),
            ApiError::StaleWrite {
                invoice_id,
                current_review_version,
            } => (
                StatusCode::CONFLICT,
                json!({
                    "error_code": "STALE_WRITE",
                    "message": "Submission was based on an outdated review version",
                    "invoice_id": invoice_id,
                    "current_review_version": current_review_version,
                }),
            ),
            ApiError::InvalidTransition { from, to } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error_code": "INVALID_TRANSITION",
                    "message": format!("Cannot move an invoice from {from} to {to}"),
                }),
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error_code": "BAD_REQUEST", "message": message}),
            ),
            ApiError::Internal(message) => {
                tracing::error!(message = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error_code": "INTERNAL", "message": "Internal server error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
