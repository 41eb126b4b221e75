//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Network      │  │     Response            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Auth (fatal)   │  │  MalformedResponse      │ │
//! │  │  InvalidUrl     │  │  Network        │  │  (per connection,       │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │   never fails episode)  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Database     │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Database       │  │  Cancelled      │                              │
//! │  │                 │  │  Internal       │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-region registration failures are `RegionApplyError`s in the adapter
//! module. They are logged and never become a `SyncError`.

use thiserror::Error;

use connect_core::ParseError;

use crate::adapter::FetchError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// The server rejected the user token. Fatal to the episode.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure. The next natural trigger retries.
    #[error("Network error: {0}")]
    Network(String),

    /// A fetch exceeded the configured timeout.
    #[error("Fetch timeout after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Response Errors
    // =========================================================================
    /// A connection response could not be parsed.
    #[error("Malformed response for connection {connection_id}: {source}")]
    MalformedResponse {
        connection_id: String,
        #[source]
        source: ParseError,
    },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local store failure.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A caller passed an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The episode was cancelled before it could finish.
    #[error("Synchronization cancelled")]
    Cancelled,

    /// Internal coordinator error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<connect_db::DbError> for SyncError {
    fn from(err: connect_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(message) => SyncError::Auth(message),
            FetchError::Network(message) => SyncError::Network(message),
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later trigger may succeed where this one failed.
    ///
    /// The coordinator never retries on its own; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }

    /// Returns true if the user token was rejected.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("offline".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());

        assert!(!SyncError::Auth("expired".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn test_fetch_error_mapping() {
        assert!(SyncError::from(FetchError::Auth("401".into())).is_auth_error());
        assert!(SyncError::from(FetchError::Network("reset".into())).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::MalformedResponse {
            connection_id: "LMhuSZW9".into(),
            source: ParseError::MissingField("name"),
        };
        assert!(err.to_string().contains("LMhuSZW9"));
        assert!(err.to_string().contains("name"));
    }
}
