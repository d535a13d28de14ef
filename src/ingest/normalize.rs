//! Reading validation and normalization
//!
//! A raw reading is either turned into a [`Reading`] or rejected with a
//! [`RejectionReason`]. Rejected readings are never stored.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;

use crate::data::{RawReading, Reading, ReadingId, SensorType, Shipment, ShipmentId, Unit};
use crate::thresholds::{SensorThreshold, ThresholdRegistry};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a raw reading was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectionReason {
    #[error("Unknown shipment: {0}")]
    UnknownShipment(String),

    #[error("Shipment {0} is delivered or archived")]
    InactiveShipment(ShipmentId),

    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unit mismatch: got '{got}', expected '{expected}'")]
    UnitMismatch { got: String, expected: Unit },

    #[error("Missing timestamp")]
    MissingTimestamp,

    #[error("Unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid location: lat {lat}, lon {lon}")]
    InvalidLocation { lat: f64, lon: f64 },
}

/// Validates raw readings against the sensor catalogue, shipments and thresholds
#[derive(Clone)]
pub struct ReadingValidator {
    registry: Arc<ThresholdRegistry>,
}

impl ReadingValidator {
    pub fn new(registry: Arc<ThresholdRegistry>) -> Self {
        Self { registry }
    }

    /// Shape checks that need no stored state
    pub fn parse(&self, raw: &RawReading) -> Result<Reading, RejectionReason> {
        let shipment_id = raw.shipment_id.trim();
        if shipment_id.is_empty() {
            return Err(RejectionReason::UnknownShipment(raw.shipment_id.clone()));
        }
        let shipment_id = ShipmentId::new(shipment_id);

        let sensor_type = SensorType::new(&raw.sensor_type);
        if sensor_type.is_empty() || !self.registry.is_recognized(&sensor_type) {
            return Err(RejectionReason::UnknownSensorType(raw.sensor_type.clone()));
        }

        let value = match raw.value {
            Some(v) if v.is_finite() => v,
            Some(v) => return Err(RejectionReason::InvalidValue(v.to_string())),
            None => return Err(RejectionReason::InvalidValue("missing".to_string())),
        };

        let timestamp = match raw.timestamp.as_deref().map(str::trim) {
            None | Some("") => return Err(RejectionReason::MissingTimestamp),
            Some(ts) => parse_timestamp(ts)
                .ok_or_else(|| RejectionReason::InvalidTimestamp(ts.to_string()))?,
        };

        if let Some(location) = raw.location {
            if !location.is_valid() {
                return Err(RejectionReason::InvalidLocation {
                    lat: location.lat,
                    lon: location.lon,
                });
            }
        }

        let id = match raw.reading_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => ReadingId::new(id),
            _ => ReadingId::derive(&shipment_id, &sensor_type, timestamp),
        };

        Ok(Reading {
            id,
            shipment_id,
            sensor_type,
            value,
            unit: Unit::new(&raw.unit),
            timestamp,
            location: raw.location,
        })
    }

    /// The reading must reference a known shipment that still accepts readings
    pub fn check_shipment(
        &self,
        reading: &Reading,
        shipment: Option<&Shipment>,
    ) -> Result<(), RejectionReason> {
        match shipment {
            None => Err(RejectionReason::UnknownShipment(
                reading.shipment_id.to_string(),
            )),
            Some(s) if s.is_terminal() => Err(RejectionReason::InactiveShipment(s.id.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Units must match exactly after alias canonicalization; nothing is converted.
    /// Without a resolved threshold the sensor profile's declared unit applies.
    pub fn check_unit(
        &self,
        reading: &Reading,
        threshold: Option<&SensorThreshold>,
    ) -> Result<(), RejectionReason> {
        let expected = match threshold {
            Some(t) => t.unit.clone(),
            None => match self.registry.profile(&reading.sensor_type) {
                Some(profile) => profile.unit,
                None => return Err(RejectionReason::UnknownSensorType(reading.sensor_type.to_string())),
            },
        };

        if reading.unit == expected {
            Ok(())
        } else {
            Err(RejectionReason::UnitMismatch {
                got: reading.unit.to_string(),
                expected,
            })
        }
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
