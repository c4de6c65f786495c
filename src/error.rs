//! Error handling for the ToyVerse core

use std::fmt;
use thiserror::Error;
use toyverse_auth::AuthError;
use toyverse_postgrest::PostgrestError;
use toyverse_storage::StorageError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the ToyVerse core
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Database query errors
    #[error("Database error: {0}")]
    Database(#[from] PostgrestError),

    /// Object storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Input rejected before any external call
    #[error("Validation error: {0}")]
    Validation(String),

    /// No signed-in user
    #[error("No active session")]
    Unauthenticated,

    /// A record that should exist does not
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The in-memory backend refused an operation
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new backend error
    pub fn backend<T: fmt::Display>(msg: T) -> Self {
        Error::Backend(msg.to_string())
    }
}
