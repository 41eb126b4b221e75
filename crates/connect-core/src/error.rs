//! # Error Types
//!
//! Domain-specific error types for connect-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  connect-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  ├── ParseError       - Malformed connection responses                 │
//! │  └── ValidationError  - Out-of-range trigger fields                    │
//! │                                                                         │
//! │  connect-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  connect-sync errors (separate crate)                                  │
//! │  └── SyncError        - What the coordinator reports                   │
//! │                                                                         │
//! │  Flow: ValidationError → (trigger dropped)                             │
//! │        ParseError → CoreError → SyncError::MalformedResponse           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The server response could not be turned into a `Connection`.
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] ParseError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Parse Error
// =============================================================================

/// Reasons a connection response is rejected as a whole.
///
/// Only required fields produce these. Optional fields that are missing or
/// malformed fall back to empty values instead.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The top-level value is not a JSON object.
    #[error("expected a JSON object at the top level")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A required field is present but has the wrong shape.
    #[error("field '{field}' has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// A required string field is empty.
    #[error("field '{0}' must not be empty")]
    Empty(&'static str),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::InvalidJson(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Per-field validation errors for trigger values.
///
/// A location trigger failing validation is dropped from the connection; the
/// rest of the parse continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    /// Value must be positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive { field: String, value: f64 },

    /// Value is NaN or infinite.
    #[error("{field} must be a finite number")]
    NotFinite { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
