//! HTTP routes for the review service.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::ApiError;
use crate::config::{Settings, APP_NAME, APP_VERSION};
use crate::db::repository;
use crate::models::enums::ProcessingState;
use crate::review::{
    self, FieldValidation, LineItemValidation, ValidationSubmission,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub settings: Arc<Settings>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/invoices", get(list_invoices))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/invoices/:id/history", get(get_history))
        .route("/api/invoices/:id/review", post(submit_review))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": APP_NAME, "version": APP_VERSION}))
}

#[derive(Deserialize)]
struct ListQuery {
    state: String,
}

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ProcessingState::from_str(&query.state)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown state: {}", query.state)))?;
    let conn = state.db.lock().await;
    let invoices = repository::list_invoices_by_state(&conn, filter)?;
    Ok(Json(invoices))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().await;
    let invoice = repository::get_invoice(&conn, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Invoice {id} not found")))?;
    Ok(Json(invoice))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().await;
    // 404 for unknown invoices rather than an empty history.
    repository::get_invoice(&conn, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Invoice {id} not found")))?;
    let history = repository::list_review_history(&conn, &id)?;
    Ok(Json(history))
}

/// Review submission body. The invoice id comes from the path.
#[derive(Debug, Deserialize)]
struct ReviewRequest {
    expected_review_version: i64,
    #[serde(default)]
    field_validations: Vec<FieldValidation>,
    #[serde(default)]
    line_item_validations: Vec<LineItemValidation>,
    overall_status: ProcessingState,
    #[serde(default)]
    reviewer: Option<String>,
    #[serde(default)]
    validation_notes: Option<String>,
}

async fn submit_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = ValidationSubmission {
        invoice_id: id,
        expected_review_version: request.expected_review_version,
        field_validations: request.field_validations,
        line_item_validations: request.line_item_validations,
        overall_status: request.overall_status,
        reviewer: request.reviewer,
        validation_notes: request.validation_notes,
    };

    let mut conn = state.db.lock().await;
    let accepted = review::submit(&mut conn, &submission, &state.settings.default_currency)?;
    Ok((StatusCode::OK, Json(accepted)))
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
