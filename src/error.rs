//! Error types shared across the tracker.
//!
//! Per-cycle failures (auth, fetch, persist) are caught at the orchestrator
//! boundary and logged; only configuration errors are fatal to the process.

use thiserror::Error;

/// Credential exchange against the token endpoint failed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Token endpoint answered with a non-success status.
    #[error("token endpoint returned {0}")]
    Status(reqwest::StatusCode),

    /// Response body did not carry a usable token.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// A vehicle-location or stop-lookup call failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Could not obtain a valid token; the data call was never attempted.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transport-level failure on the data call.
    #[error("api request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Data endpoint answered with a non-success status.
    #[error("api returned {0}")]
    Status(reqwest::StatusCode),

    /// Body was not the expected JSON shape.
    #[error("malformed api response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// True when the underlying failure was the credential exchange, not the
    /// data call itself.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// A write to the persistence collaborator failed. Never fatal to the loop.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writer queue is full; the record was dropped.
    #[error("store queue full")]
    QueueFull,

    /// Writer task is gone; no further records can be persisted.
    #[error("store queue closed")]
    QueueClosed,
}

/// Configuration is unusable. Raised once at startup, always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
