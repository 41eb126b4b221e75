//! # Regions
//!
//! A `Region` is a circular geofence backing a location trigger.
//!
//! ## Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two regions are the same monitored geofence iff identifiers match.    │
//! │                                                                         │
//! │  Region { id: "ifttt_a", r: 100, (1,2) }                               │
//! │  Region { id: "ifttt_a", r: 250, (1,2) }   ==  (same geofence)         │
//! │                                            but !same_geometry          │
//! │                                                                         │
//! │  The reconciler uses `same_geometry` to turn a changed geofence into   │
//! │  remove + add, since the OS has no in-place update.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use ts_rs::TS;

use crate::validation::{
    validate_identifier, validate_latitude, validate_longitude, validate_radius,
    ValidationResult,
};

/// Mean earth radius in meters, used for great-circle distances.
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

// =============================================================================
// Coordinate
// =============================================================================

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate after range-checking both components.
    pub fn new(latitude: f64, longitude: f64) -> ValidationResult<Self> {
        validate_latitude(latitude)?;
        validate_longitude(longitude)?;
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }
}

// =============================================================================
// Region
// =============================================================================

/// A circular geofence: center, radius in meters and a namespaced identifier.
///
/// Equality and hashing look at the identifier only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Region {
    /// Stable identifier, unique within the owning connection.
    pub identifier: String,

    /// Radius in meters (always positive).
    pub radius: f64,

    /// Center of the geofence.
    pub center: Coordinate,
}

impl Region {
    /// Creates a validated region.
    pub fn new(identifier: impl Into<String>, radius: f64, center: Coordinate) -> ValidationResult<Self> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;
        validate_radius(radius)?;
        validate_latitude(center.latitude)?;
        validate_longitude(center.longitude)?;

        Ok(Region {
            identifier,
            radius,
            center,
        })
    }

    /// Returns true when radius and center are bit-for-bit identical.
    ///
    /// Values are persisted as full-precision floats, so exact comparison is
    /// what keeps a re-read region from looking modified.
    pub fn same_geometry(&self, other: &Region) -> bool {
        self.radius == other.radius && self.center == other.center
    }

    /// Returns true when identifier, radius and center all match.
    pub fn is_identical(&self, other: &Region) -> bool {
        self.identifier == other.identifier && self.same_geometry(other)
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Region {}

impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
