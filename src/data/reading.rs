use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::sensor::{SensorKey, SensorType, Unit};
use super::shipment::ShipmentId;
use crate::classify::Classification;
use crate::thresholds::SensorThreshold;

/// Reading identifier, unique across all readings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(String);

impl ReadingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for feeds that do not assign one, so a re-sent
    /// payload still deduplicates.
    pub fn derive(shipment_id: &ShipmentId, sensor_type: &SensorType, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}:{}:{}",
            shipment_id,
            sensor_type,
            at.timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReadingId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Optional position attached to a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Reading as delivered by the ingestion transport, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub reading_id: Option<String>,
    pub shipment_id: String,
    pub sensor_type: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    /// RFC 3339, or `YYYY-MM-DD HH:MM:SS` interpreted as UTC
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

/// Validated, normalized reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub shipment_id: ShipmentId,
    pub sensor_type: SensorType,
    pub value: f64,
    pub unit: Unit,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

impl Reading {
    pub fn key(&self) -> SensorKey {
        SensorKey::new(self.shipment_id.clone(), self.sensor_type.clone())
    }
}

/// How the engine handled a persisted reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    /// Classified and fed to the alert lifecycle
    Classified { classification: Classification },
    /// No threshold resolved; needs operator attention
    Unclassified,
    /// Older than the last sequenced reading for its key; kept out of the lifecycle
    OutOfOrder { watermark: DateTime<Utc> },
}

/// A reading as persisted, with the threshold it was judged against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub reading: Reading,
    pub disposition: Disposition,
    #[serde(default)]
    pub threshold: Option<SensorThreshold>,
    pub ingested_at: DateTime<Utc>,
}

impl StoredReading {
    pub fn classification(&self) -> Option<&Classification> {
        match &self.disposition {
            Disposition::Classified { classification } => Some(classification),
            _ => None,
        }
    }

    /// Whether this reading advanced the per-key ordering watermark
    pub fn is_sequenced(&self) -> bool {
        matches!(self.disposition, Disposition::Classified { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_derived_reading_id_is_stable() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let a = ReadingId::derive(&"SHP-101".into(), &"core_temperature".into(), at);
        let b = ReadingId::derive(&"SHP-101".into(), &"core_temperature".into(), at);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("SHP-101:core_temperature:"));
    }

    #[test]
    fn test_geolocation_bounds() {
        assert!(GeoLocation { lat: 19.07, lon: 72.87 }.is_valid());
        assert!(!GeoLocation { lat: 91.0, lon: 0.0 }.is_valid());
        assert!(!GeoLocation { lat: 0.0, lon: f64::NAN }.is_valid());
    }

    #[test]
    fn test_raw_reading_from_json() {
        let raw: RawReading = serde_json::from_str(
            r#"{"shipment_id":"SHP-101","sensor_type":"humidity","value":45.5,"unit":"%","timestamp":"2024-01-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(raw.value, Some(45.5));
        assert!(raw.reading_id.is_none());
        assert!(raw.location.is_none());
    }
}
