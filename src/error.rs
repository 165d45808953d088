//! Errors raised at the record/edge store boundary.
//!
//! The ranking engine never propagates these to a search caller: each channel
//! logs the failure and degrades to an empty (or zero) result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
