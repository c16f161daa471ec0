//! Error types for delivery-sync.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for a sync run. Per-row and per-family failures
/// never reach it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown carrier family in route table: {0}")]
    UnknownFamily(String),
}

/// Session bootstrap errors. Isolated to the failing carrier family.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Credentials for {family} are not configured")]
    NotConfigured { family: String },

    #[error("Token request for {family} failed: {reason}")]
    RequestFailed { family: String, reason: String },

    #[error("Token response for {family} was rejected with status {status}")]
    Rejected { family: String, status: u16 },

    #[error("Token response for {family} is missing {field}")]
    MissingToken { family: String, field: String },
}

/// Failures inside a carrier adapter. Never escape the adapter boundary; they
/// are folded into a `DeliveryOutcome::Error` diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unreadable response: {0}")]
    Parse(String),

    #[error("session unusable: {0}")]
    Session(String),
}

impl From<reqwest::Error> for CarrierError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<roxmltree::Error> for CarrierError {
    fn from(e: roxmltree::Error) -> Self {
        Self::Parse(format!("XML: {e}"))
    }
}

impl From<serde_json::Error> for CarrierError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(format!("JSON: {e}"))
    }
}

/// Ledger document errors. Abort the current batch only.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Workbook {0} has no worksheet")]
    NoWorksheet(PathBuf),

    #[error("Missing required column(s) in {path}: {missing}")]
    MissingColumns { path: PathBuf, missing: String },

    #[error("Failed to save {path}: {reason}")]
    Save { path: PathBuf, reason: String },
}

/// Result type alias for delivery-sync.
pub type Result<T> = std::result::Result<T, Error>;
