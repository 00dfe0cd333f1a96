//! Error types for docrelay.

use thiserror::Error;

use crate::core::bus::DeliveryError;
use crate::protocol::TraceId;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Request {trace_id} failed: {reason}")]
    Failed { trace_id: TraceId, reason: String },

    #[error("{0}")]
    Other(String),
}
