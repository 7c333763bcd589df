//! Factura: invoice document extraction with confidence-gated LLM correction
//! and a human review service.
//!
//! The pipeline turns raw document bytes into a canonical invoice record:
//! the provider gateway extracts (with retry and graceful degradation), the
//! mapper normalizes into the canonical field vocabulary, weak fields are
//! corrected by an LLM one group at a time, arithmetic checks cross-validate
//! the amounts, and the record is persisted for review. Reviewers then
//! iterate on the record through a version-guarded submission protocol until
//! it is approved.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod review;
