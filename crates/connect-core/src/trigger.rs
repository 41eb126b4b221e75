//! # Triggers
//!
//! Conditions that can activate a connection. Only the location variant is
//! interpreted; every other kind is carried as its original JSON object so it
//! serialises back without loss.
//!
//! ## Wire Shape
//! ```json
//! { "type": "location", "id": "somecoolidentifier",
//!   "radius": 123.456789, "center": { "lat": 12.4567892, "lng": -98.5432112 } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ValidationError;
use crate::identifier::namespaced;
use crate::region::{Coordinate, Region};
use crate::validation::ValidationResult;

/// Wire tag of the location trigger.
pub const LOCATION_TRIGGER_TYPE: &str = "location";

/// A trigger the user has active on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Trigger {
    /// Fires on entering/leaving a geofence.
    Location(Region),

    /// Any other trigger kind, kept verbatim.
    Other(Map<String, Value>),
}

impl Trigger {
    /// Builds a trigger from one element of `user_triggers`.
    ///
    /// Location triggers are validated and their identifier namespaced.
    /// Unknown kinds must still be JSON objects.
    pub fn from_wire(value: &Value) -> ValidationResult<Self> {
        let object = value.as_object().ok_or_else(|| required("trigger"))?;

        if object.get("type").and_then(Value::as_str) != Some(LOCATION_TRIGGER_TYPE) {
            return Ok(Trigger::Other(object.clone()));
        }

        let identifier = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| required("identifier"))?;
        let radius = number(object, "radius")?;
        let center = object
            .get("center")
            .and_then(Value::as_object)
            .ok_or_else(|| required("center"))?;
        let latitude = number(center, "lat")?;
        let longitude = number(center, "lng")?;

        let region = Region::new(
            namespaced(identifier),
            radius,
            Coordinate::new(latitude, longitude)?,
        )?;

        Ok(Trigger::Location(region))
    }

    /// The region of a location trigger.
    pub fn as_region(&self) -> Option<&Region> {
        match self {
            Trigger::Location(region) => Some(region),
            Trigger::Other(_) => None,
        }
    }

    /// Returns true for the location variant.
    pub fn is_location(&self) -> bool {
        matches!(self, Trigger::Location(_))
    }

    /// Like `==`, but location triggers must also match in geometry.
    pub fn is_identical(&self, other: &Trigger) -> bool {
        match (self, other) {
            (Trigger::Location(a), Trigger::Location(b)) => a.is_identical(b),
            (Trigger::Other(a), Trigger::Other(b)) => a == b,
            _ => false,
        }
    }
}

fn required(field: &str) -> ValidationError {
    ValidationError::Required {
        field: field.to_string(),
    }
}

fn number(object: &Map<String, Value>, field: &str) -> ValidationResult<f64> {
    object
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| required(field))
}

impl From<Trigger> for Value {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Location(region) => json!({
                "type": LOCATION_TRIGGER_TYPE,
                "id": region.identifier,
                "radius": region.radius,
                "center": {
                    "lat": region.center.latitude,
                    "lng": region.center.longitude,
                },
            }),
            Trigger::Other(object) => Value::Object(object),
        }
    }
}

impl TryFrom<Value> for Trigger {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Trigger::from_wire(&value)
    }
}
