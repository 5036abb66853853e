//! Error types for the deployment pipeline

use thiserror::Error;

/// Main error type for sitedeploy
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Fetching source content failed (git, archive)
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Preparing the static tree failed
    #[error("Sanitization error: {0}")]
    Sanitization(String),

    /// The reverse proxy rejected or could not apply a route change
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// A deployment cannot start (missing git config, no active domains)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
