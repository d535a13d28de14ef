pub mod alert;
pub mod reading;
pub mod sensor;
pub mod shipment;

pub use alert::{Alert, AlertId, Severity};
pub use reading::{Disposition, GeoLocation, RawReading, Reading, ReadingId, StoredReading};
pub use sensor::{SensorKey, SensorType, Unit};
pub use shipment::{Shipment, ShipmentId, ShipmentStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time window `[from, to)`; a missing bound is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}
