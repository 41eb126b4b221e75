//! # Validation Module
//!
//! Range checks for the numeric fields of a location trigger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Trigger Validation                                 │
//! │                                                                         │
//! │  user_triggers[i] (JSON)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_identifier ── empty? ───────────────┐                        │
//! │  validate_radius ────── ≤ 0 / NaN? ───────────┤                        │
//! │  validate_latitude ──── outside [-90,90]? ────┼──► trigger dropped     │
//! │  validate_longitude ─── outside [-180,180]? ──┘    (warn, continue)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Trigger::Location(Region)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use connect_core::validation::{validate_latitude, validate_radius};
//!
//! assert!(validate_radius(150.0).is_ok());
//! assert!(validate_radius(0.0).is_err());
//! assert!(validate_latitude(91.0).is_err());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a region radius in meters.
///
/// ## Rules
/// - Must be finite
/// - Must be strictly positive
pub fn validate_radius(radius: f64) -> ValidationResult<()> {
    if !radius.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "radius".to_string(),
        });
    }

    if radius <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "radius".to_string(),
            value: radius,
        });
    }

    Ok(())
}

/// Validates a latitude in degrees, inclusive range [-90, 90].
pub fn validate_latitude(latitude: f64) -> ValidationResult<()> {
    validate_range("latitude", latitude, -90.0, 90.0)
}

/// Validates a longitude in degrees, inclusive range [-180, 180].
pub fn validate_longitude(longitude: f64) -> ValidationResult<()> {
    validate_range("longitude", longitude, -180.0, 180.0)
}

/// Validates a region identifier (non-empty after trimming).
pub fn validate_identifier(identifier: &str) -> ValidationResult<()> {
    if identifier.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "identifier".to_string(),
        });
    }
    Ok(())
}

fn validate_range(field: &str, value: f64, min: f64, max: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }

    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
            value,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
