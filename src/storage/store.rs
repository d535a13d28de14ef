use chrono::{DateTime, Utc};

use crate::data::{
    Alert, AlertId, ReadingId, SensorKey, SensorType, Shipment, ShipmentId, StoredReading,
    TimeRange,
};
use crate::thresholds::SensorThreshold;

/// Persistence collaborator used by the engine
///
/// Implementations must make each call atomic on its own. The engine never relies on
/// an in-process cache as the source of truth: everything it needs after a restart is
/// read back through this trait.
pub trait Store: Send + Sync {
    // Shipments

    /// Register a shipment. Fails with `Conflict` if the id is taken.
    fn save_shipment(&self, shipment: &Shipment) -> Result<(), StoreError>;

    fn load_shipment(&self, id: &ShipmentId) -> Result<Option<Shipment>, StoreError>;

    /// Replace a stored shipment. Fails with `NotFound` if it was never saved.
    fn update_shipment(&self, shipment: &Shipment) -> Result<(), StoreError>;

    fn list_shipments(&self) -> Result<Vec<Shipment>, StoreError>;

    // Thresholds

    /// Insert or replace the threshold for its (scope, sensor type)
    fn save_threshold(&self, threshold: &SensorThreshold) -> Result<(), StoreError>;

    /// Exact-scope lookup: `Some(shipment)` finds an override, `None` the default
    fn load_threshold(
        &self,
        shipment_id: Option<&ShipmentId>,
        sensor_type: &SensorType,
    ) -> Result<Option<SensorThreshold>, StoreError>;

    // Readings

    /// Append a reading. Fails with `Conflict` if its key already holds the id.
    fn save_reading(&self, reading: &StoredReading) -> Result<(), StoreError>;

    /// Reading ids are unique per key, not across the store
    fn reading_exists(&self, key: &SensorKey, id: &ReadingId) -> Result<bool, StoreError>;

    /// Latest timestamp among readings that went through the alert lifecycle
    fn last_sequenced_timestamp(&self, key: &SensorKey)
        -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Readings for a key in the range, ordered by timestamp then ingestion
    fn load_readings(
        &self,
        key: &SensorKey,
        range: TimeRange,
    ) -> Result<Vec<StoredReading>, StoreError>;

    /// All readings of a shipment in the range, ordered by timestamp
    fn load_shipment_readings(
        &self,
        shipment_id: &ShipmentId,
        range: TimeRange,
    ) -> Result<Vec<StoredReading>, StoreError>;

    // Alerts

    /// Insert a new open alert and return its id. Fails with `Conflict` if the
    /// key already has an open alert.
    fn save_alert(&self, alert: &Alert) -> Result<AlertId, StoreError>;

    /// Replace a stored alert. Closed alerts are terminal: updating one fails
    /// with `Conflict`.
    fn update_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    fn find_open_alert(&self, key: &SensorKey) -> Result<Option<Alert>, StoreError>;

    /// Alerts of a shipment whose open window overlaps the range, by `opened_at`
    fn load_alerts(&self, shipment_id: &ShipmentId, range: TimeRange)
        -> Result<Vec<Alert>, StoreError>;

    fn open_alerts(&self, shipment_id: &ShipmentId) -> Result<Vec<Alert>, StoreError>;
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Temporary failure; the call may succeed if retried
    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
