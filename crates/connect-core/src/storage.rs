//! # Connection Storage View
//!
//! A read-only view derived from one `Connection`. It is never persisted on
//! its own and is rebuilt whenever it is needed.

use crate::connection::Connection;
use crate::region::Region;
use crate::trigger::Trigger;

/// Derived trigger information for a single connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStorage<'a> {
    connection: &'a Connection,
}

impl<'a> ConnectionStorage<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        ConnectionStorage { connection }
    }

    /// The connection this view reads from.
    pub fn connection(&self) -> &'a Connection {
        self.connection
    }

    /// True if any active trigger is a location trigger.
    pub fn has_location_triggers(&self) -> bool {
        self.connection
            .active_user_triggers()
            .iter()
            .any(Trigger::is_location)
    }

    /// Regions of the location triggers, in trigger order.
    pub fn location_regions(&self) -> Vec<Region> {
        self.connection
            .active_user_triggers()
            .iter()
            .filter_map(Trigger::as_region)
            .cloned()
            .collect()
    }
}

impl<'a> From<&'a Connection> for ConnectionStorage<'a> {
    fn from(connection: &'a Connection) -> Self {
        ConnectionStorage::new(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIXTURE: &str = include_str!("../fixtures/fetch_connection_response.json");

    #[test]
    fn test_fixture_storage() {
        let connection = Connection::parse(FIXTURE.as_bytes()).unwrap();
        let storage = ConnectionStorage::new(&connection);

        assert!(storage.has_location_triggers());
        let first = storage.location_regions().into_iter().next().unwrap();
        assert_eq!(first.radius, 123.4567890);
        assert_eq!(first.center.latitude, 12.45678920);
        assert_eq!(first.center.longitude, -98.5432112);
        assert_eq!(first.identifier, "ifttt_somecoolidentifier");
    }

    #[test]
    fn test_projection_preserves_order_and_skips_other_kinds() {
        let raw = json!({
            "id": "c1",
            "name": "Mixed",
            "user_triggers": [
                { "type": "location", "id": "b", "radius": 10.0, "center": { "lat": 0.0, "lng": 0.0 } },
                { "type": "weather", "when": "rain" },
                { "type": "location", "id": "a", "radius": 20.0, "center": { "lat": 1.0, "lng": 1.0 } }
            ]
        });
        let connection = Connection::from_value(&raw).unwrap();
        let storage = ConnectionStorage::from(&connection);

        let ids: Vec<String> = storage
            .location_regions()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["ifttt_b", "ifttt_a"]);
        assert!(storage.has_location_triggers());
    }

    #[test]
    fn test_no_location_triggers() {
        let raw = json!({
            "id": "c2",
            "name": "Plain",
            "user_triggers": [{ "type": "weather" }]
        });
        let connection = Connection::from_value(&raw).unwrap();
        let storage = ConnectionStorage::new(&connection);

        assert!(!storage.has_location_triggers());
        assert!(storage.location_regions().is_empty());
        assert_eq!(storage.connection().id(), "c2");
    }
}
