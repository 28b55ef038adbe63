//! Error handling for the movement report pipeline
//!
//! Defines the typed error taxonomy and establishes a unified Result type
//! using anyhow for context chaining and error propagation. Callers that need
//! to tell error classes apart use `anyhow::Error::downcast_ref`.

use std::time::Duration;

use thiserror::Error;

/// Core error types for export requests and report generation
#[derive(Error, Debug)]
pub enum MovementsError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("timeout error: no completion signal after {0:?}")]
    Timeout(Duration),

    #[error("schema error: missing column(s) {0}")]
    Schema(String),

    #[error("roster lookup error: no client entry for {0}")]
    RosterLookup(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl MovementsError {
    /// Whether the error must terminate the whole run instead of one client.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Config(_))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = anyhow::Result<T>;
