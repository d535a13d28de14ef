use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::reading::ReadingId;
use super::sensor::{SensorKey, SensorType};
use super::shipment::ShipmentId;

/// Store-assigned alert identifier. Zero means "not yet saved".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AlertId(pub u64);

impl AlertId {
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{}", self.0)
    }
}

/// Alert severity; ordering is escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A continuous span of violating readings for one (shipment, sensor type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub shipment_id: ShipmentId,
    pub sensor_type: SensorType,
    pub severity: Severity,
    pub opened_at: DateTime<Utc>,
    /// `None` while the alert is open
    pub closed_at: Option<DateTime<Utc>>,
    /// Append-only while open, in arrival order
    pub triggering_readings: Vec<ReadingId>,
    /// Signed margin with the largest magnitude seen while open
    pub peak_margin: f64,
    /// Reading value that produced `peak_margin`
    pub peak_value: f64,
}

impl Alert {
    /// Open a new alert from its first violating reading
    pub fn open(
        key: &SensorKey,
        severity: Severity,
        reading_id: ReadingId,
        at: DateTime<Utc>,
        margin: f64,
        value: f64,
    ) -> Self {
        Self {
            id: AlertId::default(),
            shipment_id: key.shipment_id.clone(),
            sensor_type: key.sensor_type.clone(),
            severity,
            opened_at: at,
            closed_at: None,
            triggering_readings: vec![reading_id],
            peak_margin: margin,
            peak_value: value,
        }
    }

    pub fn key(&self) -> SensorKey {
        SensorKey::new(self.shipment_id.clone(), self.sensor_type.clone())
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn contains_reading(&self, reading_id: &ReadingId) -> bool {
        self.triggering_readings.iter().any(|id| id == reading_id)
    }

    /// Fold another violating reading into the open alert.
    ///
    /// Severity never decreases and the peak only moves outward. Returns true
    /// when the severity was raised.
    pub fn extend(&mut self, reading_id: ReadingId, severity: Severity, margin: f64, value: f64) -> bool {
        self.triggering_readings.push(reading_id);

        if margin.abs() > self.peak_margin.abs() {
            self.peak_margin = margin;
            self.peak_value = value;
        }

        if severity > self.severity {
            self.severity = severity;
            true
        } else {
            false
        }
    }

    /// Close the alert; closed alerts are terminal
    pub fn close(&mut self, at: DateTime<Utc>) {
        self.closed_at = Some(at);
    }

    /// Whether the alert's open window overlaps `[from, to)`
    pub fn overlaps(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        let starts_before_end = to.map_or(true, |to| self.opened_at < to);
        let ends_after_start = match (self.closed_at, from) {
            (Some(closed), Some(from)) => closed >= from,
            _ => true,
        };
        starts_before_end && ends_after_start
    }
}
