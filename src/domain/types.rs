//! Shared types for the bus proximity tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for vehicle IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        VehicleId(s.to_string())
    }
}

/// Vehicle record as returned by the location endpoint
#[derive(Debug, Deserialize)]
pub struct BusRecord {
    /// Vehicle identifier - the API emits it as an integer or a string
    /// depending on the fleet
    #[serde(rename = "busId", default, deserialize_with = "deserialize_id")]
    pub bus_id: Option<String>,
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// GeoJSON-style point; coordinates are `[longitude, latitude]`
#[derive(Debug, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

/// Stop record as returned by the stop lookup endpoint
#[derive(Debug, Deserialize)]
pub struct BusStopRecord {
    #[serde(rename = "busstopId", default)]
    pub busstop_id: Option<i64>,
    #[serde(default)]
    pub street1: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Line variant record as returned by the line-variants endpoint
#[derive(Debug, Deserialize)]
pub struct LineVariantRecord {
    #[serde(rename = "lineVariantId", default)]
    pub line_variant_id: Option<i64>,
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default)]
    pub subline: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or numeric identifier")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        // Some fleets emit the id as a JSON float, e.g. 812.0
        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// One vehicle snapshot from a poll cycle. Transient - built from a
/// [`BusRecord`], evaluated, discarded.
#[derive(Debug, Clone)]
pub struct VehiclePosition {
    pub vehicle_id: VehicleId,
    pub line: String,
    pub destination: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl VehiclePosition {
    /// Convert a wire record, returning `None` for records missing the
    /// vehicle id or a usable coordinate pair. Partial records are common
    /// and not an error.
    pub fn from_record(record: BusRecord) -> Option<Self> {
        let vehicle_id = match record.bus_id {
            Some(id) if !id.is_empty() => VehicleId(id),
            _ => return None,
        };
        let coords = record.location.map(|l| l.coordinates).unwrap_or_default();
        if coords.len() < 2 {
            return None;
        }
        Some(Self {
            vehicle_id,
            line: record.line.unwrap_or_default(),
            destination: record.destination.unwrap_or_default(),
            longitude: coords[0],
            latitude: coords[1],
        })
    }
}

/// The stop being watched. Resolved once at startup, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredStop {
    pub external_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

impl MonitoredStop {
    pub fn from_record(record: BusStopRecord) -> Option<Self> {
        let external_id = record.busstop_id?;
        let coords = record.location.map(|l| l.coordinates).unwrap_or_default();
        if coords.len() < 2 {
            return None;
        }
        Some(Self {
            external_id,
            longitude: coords[0],
            latitude: coords[1],
            label: format!(
                "{} y {}",
                record.street1.unwrap_or_default(),
                record.street2.unwrap_or_default()
            ),
        })
    }
}

/// A detected passage, handed to the persistence collaborator and then
/// forgotten by the tracker.
#[derive(Debug, Clone)]
pub struct PassageEvent {
    pub vehicle_id: VehicleId,
    pub line: String,
    pub destination: String,
    pub distance_meters: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub detected_at: DateTime<Utc>,
}

impl PassageEvent {
    pub fn new(
        position: &VehiclePosition,
        distance_meters: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id: position.vehicle_id.clone(),
            line: position.line.clone(),
            destination: position.destination.clone(),
            distance_meters,
            latitude: position.latitude,
            longitude: position.longitude,
            detected_at,
        }
    }
}

/// Generate a time-ordered UUIDv7 string for event identifiers
pub fn new_event_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
