use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::summary::{summarize, ShipmentSummary};
use crate::data::{
    Alert, Disposition, Reading, SensorKey, SensorType, Shipment, ShipmentId, StoredReading,
    TimeRange,
};
use crate::storage::{Store, StoreError};
use crate::thresholds::ThresholdRegistry;

/// Latest reading stored for one sensor type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub sensor_type: SensorType,
    pub reading: Reading,
    pub disposition: Disposition,
}

/// Shipment state as the dashboard shows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub shipment: Shipment,
    pub open_alerts: Vec<Alert>,
    pub latest: Vec<SensorSnapshot>,
}

/// Read-only projections over the store
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn Store>,
    registry: Arc<ThresholdRegistry>,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ThresholdRegistry>) -> Self {
        Self { store, registry }
    }

    /// Shipment, open alerts and latest reading per sensor type.
    ///
    /// Readings are loaded before alerts. The pipeline writes an alert before the
    /// reading that caused the change, so any closing reading seen here already has
    /// its alert closed.
    pub fn current_status(&self, shipment_id: &ShipmentId) -> Result<CurrentStatus, QueryError> {
        let readings = self
            .store
            .load_shipment_readings(shipment_id, TimeRange::all())?;
        let open_alerts = self.store.open_alerts(shipment_id)?;
        let shipment = self.shipment(shipment_id)?;

        let mut latest: Vec<SensorSnapshot> = Vec::new();
        for stored in readings.into_iter().filter(|r| r.is_sequenced()) {
            let StoredReading {
                reading,
                disposition,
                ..
            } = stored;
            match latest.iter_mut().find(|s| s.sensor_type == reading.sensor_type) {
                Some(slot) if slot.reading.timestamp <= reading.timestamp => {
                    slot.reading = reading;
                    slot.disposition = disposition;
                }
                Some(_) => {}
                None => latest.push(SensorSnapshot {
                    sensor_type: reading.sensor_type.clone(),
                    reading,
                    disposition,
                }),
            }
        }
        latest.sort_by(|a, b| a.sensor_type.cmp(&b.sensor_type));

        Ok(CurrentStatus {
            shipment,
            open_alerts,
            latest,
        })
    }

    /// Alerts whose open window overlaps the range, oldest first
    pub fn alert_history(
        &self,
        shipment_id: &ShipmentId,
        range: TimeRange,
    ) -> Result<Vec<Alert>, QueryError> {
        self.shipment(shipment_id)?;
        Ok(self.store.load_alerts(shipment_id, range)?)
    }

    /// Stored readings of one sensor type in the range, by timestamp
    pub fn reading_series(
        &self,
        shipment_id: &ShipmentId,
        sensor_type: &SensorType,
        range: TimeRange,
    ) -> Result<Vec<StoredReading>, QueryError> {
        self.shipment(shipment_id)?;
        if !self.registry.is_recognized(sensor_type) {
            return Err(QueryError::UnknownSensorType(sensor_type.clone()));
        }

        let key = SensorKey::new(shipment_id.clone(), sensor_type.clone());
        Ok(self.store.load_readings(&key, range)?)
    }

    /// Risk report over every reading of the shipment
    pub fn shipment_summary(&self, shipment_id: &ShipmentId) -> Result<ShipmentSummary, QueryError> {
        let readings = self
            .store
            .load_shipment_readings(shipment_id, TimeRange::all())?;
        let alerts = self.store.load_alerts(shipment_id, TimeRange::all())?;
        let shipment = self.shipment(shipment_id)?;

        Ok(summarize(&shipment, &readings, &alerts))
    }

    pub fn list_shipments(&self) -> Result<Vec<Shipment>, QueryError> {
        Ok(self.store.list_shipments()?)
    }

    fn shipment(&self, shipment_id: &ShipmentId) -> Result<Shipment, QueryError> {
        self.store
            .load_shipment(shipment_id)?
            .ok_or_else(|| QueryError::ShipmentNotFound(shipment_id.clone()))
    }
}

/// Query errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Shipment not found: {0}")]
    ShipmentNotFound(ShipmentId),

    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(SensorType),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
