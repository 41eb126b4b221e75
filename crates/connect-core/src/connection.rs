//! # Connections
//!
//! A `Connection` is a server-defined automation rule bundle: name,
//! description, cover images, features and the user's active triggers.
//!
//! ## Parsing Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Connection::parse(bytes)                             │
//! │                                                                         │
//! │  REQUIRED (fail whole parse)      OPTIONAL (default, never fail)       │
//! │  ───────────────────────────      ─────────────────────────────        │
//! │  • id   (non-empty string)        • description  → ""                  │
//! │  • name (non-empty string)        • user_status  → Unknown             │
//! │                                   • cover_image  → []                  │
//! │                                   • features     → []                  │
//! │                                   • user_triggers→ []                  │
//! │                                                                         │
//! │  A single bad trigger is dropped with a warning; the rest survive.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Connection` serialises back to the same JSON shape it parses, which is
//! how snapshots are persisted.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;
use ts_rs::TS;
use url::Url;

use crate::error::ParseError;
use crate::trigger::Trigger;

// =============================================================================
// Image Size
// =============================================================================

/// Cover image widths published by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ImageSize {
    W480,
    W720,
    W1080,
    W1440,
    W2880,
}

impl ImageSize {
    /// Pixel width of this size.
    pub const fn width(self) -> u32 {
        match self {
            ImageSize::W480 => 480,
            ImageSize::W720 => 720,
            ImageSize::W1080 => 1080,
            ImageSize::W1440 => 1440,
            ImageSize::W2880 => 2880,
        }
    }
}

// =============================================================================
// Cover Image
// =============================================================================

/// A cover image rendered for a specific pixel width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CoverImage {
    /// Target pixel width.
    pub width: u32,

    #[ts(as = "String")]
    pub url: Url,
}

/// Parses a `cover_image` key such as `"1080w"` into a width.
fn parse_width_key(key: &str) -> Option<u32> {
    key.strip_suffix('w')?.parse().ok()
}

// =============================================================================
// Feature
// =============================================================================

/// A value proposition shown for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Feature {
    pub title: String,

    #[serde(rename = "description")]
    pub details: String,

    #[ts(as = "Option<String>")]
    pub icon_url: Option<Url>,
}

// =============================================================================
// Connection Status
// =============================================================================

/// The user's relationship with a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The user has never turned the connection on.
    NeverEnabled,
    /// The connection is on.
    Enabled,
    /// The connection was turned off.
    Disabled,
    /// The server did not say, or sent something unknown.
    #[default]
    Unknown,
}

impl ConnectionStatus {
    fn from_wire(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("never_enabled") => ConnectionStatus::NeverEnabled,
            Some("enabled") => ConnectionStatus::Enabled,
            Some("disabled") => ConnectionStatus::Disabled,
            _ => ConnectionStatus::Unknown,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A parsed connection.
///
/// Fields are read-only: the identifier never changes after parse and cover
/// images stay sorted ascending by width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    id: String,
    name: String,
    description: String,
    #[serde(rename = "user_status")]
    status: ConnectionStatus,
    #[serde(rename = "cover_image", serialize_with = "serialize_cover_images")]
    cover_images: Vec<CoverImage>,
    features: Vec<Feature>,
    #[serde(rename = "user_triggers")]
    active_user_triggers: Vec<Trigger>,
}

impl Connection {
    /// Parses a raw connection response.
    ///
    /// ## Errors
    /// `ParseError` when the bytes are not a JSON object or `id`/`name` are
    /// missing, empty or not strings.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(&value)
    }

    /// Parses an already-decoded JSON value.
    pub fn from_value(value: &Value) -> Result<Self, ParseError> {
        let object = value.as_object().ok_or(ParseError::NotAnObject)?;

        let id = required_string(object, "id")?;
        let name = required_string(object, "name")?;

        let description = object
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let status = ConnectionStatus::from_wire(object.get("user_status"));
        let cover_images = parse_cover_images(&id, object.get("cover_image"));
        let features = parse_features(&id, object.get("features"));
        let active_user_triggers = parse_triggers(&id, object.get("user_triggers"));

        Ok(Connection {
            id,
            name,
            description,
            status,
            cover_images,
            features,
            active_user_triggers,
        })
    }

    /// Serialises back to the wire shape accepted by [`Connection::parse`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Cover images, ascending by width.
    pub fn cover_images(&self) -> &[CoverImage] {
        &self.cover_images
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Triggers the user currently has active, in server order.
    pub fn active_user_triggers(&self) -> &[Trigger] {
        &self.active_user_triggers
    }

    /// True when every field matches, including the radius and center of
    /// each location trigger. `==` compares regions by identifier only.
    pub fn is_identical(&self, other: &Connection) -> bool {
        self == other
            && self
                .active_user_triggers
                .iter()
                .zip(&other.active_user_triggers)
                .all(|(a, b)| a.is_identical(b))
    }

    /// Exact lookup of a cover image by published size.
    pub fn cover_image(&self, size: ImageSize) -> Option<&CoverImage> {
        self.cover_images
            .iter()
            .find(|image| image.width == size.width())
    }

    /// Best-fit cover image for a view `width` points wide at `scale`.
    ///
    /// Picks the smallest image at least `width × scale` pixels wide, falling
    /// back to the largest image when none is wide enough.
    pub fn cover_image_for(&self, width: f64, scale: f64) -> Option<&CoverImage> {
        let required = width * scale;
        self.cover_images
            .iter()
            .find(|image| f64::from(image.width) >= required)
            .or_else(|| self.cover_images.last())
    }
}

// =============================================================================
// Field Parsers
// =============================================================================

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    let value = object.get(field).ok_or(ParseError::MissingField(field))?;
    let text = value.as_str().ok_or(ParseError::WrongType {
        field,
        expected: "string",
    })?;

    if text.is_empty() {
        return Err(ParseError::Empty(field));
    }

    Ok(text.to_string())
}

fn parse_cover_images(connection_id: &str, value: Option<&Value>) -> Vec<CoverImage> {
    let Some(map) = value.and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut images: Vec<CoverImage> = map
        .iter()
        .filter_map(|(key, url)| {
            let width = parse_width_key(key)?;
            match url.as_str().map(Url::parse) {
                Some(Ok(url)) => Some(CoverImage { width, url }),
                _ => {
                    warn!(connection_id, key = %key, "Skipping cover image with invalid URL");
                    None
                }
            }
        })
        .collect();

    images.sort_by_key(|image| image.width);
    images.dedup_by_key(|image| image.width);
    images
}

fn parse_features(connection_id: &str, value: Option<&Value>) -> Vec<Feature> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let Some(title) = object.get("title").and_then(Value::as_str) else {
                warn!(connection_id, "Skipping feature without a title");
                return None;
            };

            Some(Feature {
                title: title.to_string(),
                details: object
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                icon_url: object
                    .get("icon_url")
                    .and_then(Value::as_str)
                    .and_then(|raw| Url::parse(raw).ok()),
            })
        })
        .collect()
}

fn parse_triggers(connection_id: &str, value: Option<&Value>) -> Vec<Trigger> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match Trigger::from_wire(entry) {
            Ok(trigger) => Some(trigger),
            Err(error) => {
                warn!(connection_id, index, %error, "Dropping malformed trigger");
                None
            }
        })
        .collect()
}

fn serialize_cover_images<S>(images: &[CoverImage], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(images.len()))?;
    for image in images {
        map.serialize_entry(&format!("{}w", image.width), image.url.as_str())?;
    }
    map.end()
}

// =============================================================================
// Unit Tests
// =============================================================================
