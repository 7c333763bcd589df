//! Document extraction pipeline: provider gateway → canonical mapping →
//! confidence scoring → LLM correction → arithmetic validation → persistence.

pub mod confidence;
pub mod correction;
pub mod gateway;
pub mod mapper;
pub mod processor;
pub mod render_cache;
pub mod retry;
pub mod validation;
