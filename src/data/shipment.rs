use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shipment identifier (e.g. `SHP-101`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(String);

impl ShipmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShipmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Shipment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    InTransit,
    Delivered,
    Compromised,
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InTransit => write!(f, "in_transit"),
            Self::Delivered => write!(f, "delivered"),
            Self::Compromised => write!(f, "compromised"),
        }
    }
}

/// A registered shipment
///
/// Never deleted. `archived` hides it from ingest but keeps its history queryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub scheduled_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_arrival: Option<DateTime<Utc>>,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub archived: bool,
}

impl Shipment {
    pub fn new(
        id: impl Into<ShipmentId>,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            destination: destination.into(),
            scheduled_departure: None,
            scheduled_arrival: None,
            actual_departure: None,
            actual_arrival: None,
            status: ShipmentStatus::InTransit,
            archived: false,
        }
    }

    pub fn with_schedule(mut self, departure: DateTime<Utc>, arrival: DateTime<Utc>) -> Self {
        self.scheduled_departure = Some(departure);
        self.scheduled_arrival = Some(arrival);
        self
    }

    /// Delivered, arrived and archived shipments no longer accept readings.
    /// A compromised shipment that arrives keeps its status but is still terminal.
    pub fn is_terminal(&self) -> bool {
        self.archived
            || self.status == ShipmentStatus::Delivered
            || self.actual_arrival.is_some()
    }
}

impl From<String> for ShipmentId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
