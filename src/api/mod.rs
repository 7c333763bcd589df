//! HTTP review service: invoice reads, review history, and the submission
//! endpoint that drives the optimistic-concurrency protocol.

pub mod error;
pub mod router;

pub use error::ApiError;
pub use router::{router, AppState};
