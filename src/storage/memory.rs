//! In-process store
//!
//! All relations live behind a single `RwLock`, so every read sees a consistent
//! snapshot across shipments, readings and alerts.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::snapshot::StoreSnapshot;
use super::store::{Store, StoreError};
use crate::data::{
    Alert, AlertId, ReadingId, SensorKey, SensorType, Shipment, ShipmentId, StoredReading,
    TimeRange,
};
use crate::thresholds::SensorThreshold;

type ThresholdKey = (Option<ShipmentId>, SensorType);

#[derive(Debug, Default)]
struct Tables {
    shipments: BTreeMap<ShipmentId, Shipment>,
    thresholds: HashMap<ThresholdKey, SensorThreshold>,
    /// Append-only, in ingestion order
    readings: Vec<StoredReading>,
    reading_index: HashMap<(SensorKey, ReadingId), usize>,
    readings_by_key: HashMap<SensorKey, Vec<usize>>,
    watermarks: HashMap<SensorKey, DateTime<Utc>>,
    alerts: BTreeMap<AlertId, Alert>,
    open_alerts: HashMap<SensorKey, AlertId>,
    next_alert_id: u64,
}

impl Tables {
    fn append_reading(&mut self, reading: StoredReading) {
        let key = reading.reading.key();
        let idx = self.readings.len();

        if reading.is_sequenced() {
            let at = reading.reading.timestamp;
            self.watermarks
                .entry(key.clone())
                .and_modify(|w| {
                    if at > *w {
                        *w = at;
                    }
                })
                .or_insert(at);
        }

        self.reading_index
            .insert((key.clone(), reading.reading.id.clone()), idx);
        self.readings_by_key.entry(key).or_default().push(idx);
        self.readings.push(reading);
    }

    fn insert_alert(&mut self, alert: Alert) {
        if alert.is_open() {
            self.open_alerts.insert(alert.key(), alert.id);
        }
        self.next_alert_id = self.next_alert_id.max(alert.id.0);
        self.alerts.insert(alert.id, alert);
    }
}

/// Thread-safe in-memory implementation of [`Store`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store, including its indexes, from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut tables = Tables::default();

        for shipment in snapshot.shipments {
            tables.shipments.insert(shipment.id.clone(), shipment);
        }
        for threshold in snapshot.thresholds {
            let key = (threshold.scope.shipment().cloned(), threshold.sensor_type.clone());
            tables.thresholds.insert(key, threshold);
        }
        for reading in snapshot.readings {
            tables.append_reading(reading);
        }
        for alert in snapshot.alerts {
            tables.insert_alert(alert);
        }
        tables.next_alert_id = tables.next_alert_id.max(snapshot.next_alert_id);

        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Copy every relation out for serialization
    pub fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read();
        StoreSnapshot {
            shipments: tables.shipments.values().cloned().collect(),
            thresholds: tables.thresholds.values().cloned().collect(),
            readings: tables.readings.clone(),
            alerts: tables.alerts.values().cloned().collect(),
            next_alert_id: tables.next_alert_id,
        }
    }

    /// Number of stored readings
    pub fn reading_count(&self) -> usize {
        self.tables.read().readings.len()
    }

    /// Number of stored alerts, open and closed
    pub fn alert_count(&self) -> usize {
        self.tables.read().alerts.len()
    }
}

impl Store for MemoryStore {
    fn save_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.shipments.contains_key(&shipment.id) {
            return Err(StoreError::Conflict(format!(
                "shipment {} already exists",
                shipment.id
            )));
        }
        tables.shipments.insert(shipment.id.clone(), shipment.clone());
        Ok(())
    }

    fn load_shipment(&self, id: &ShipmentId) -> Result<Option<Shipment>, StoreError> {
        Ok(self.tables.read().shipments.get(id).cloned())
    }

    fn update_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        match tables.shipments.get_mut(&shipment.id) {
            Some(existing) => {
                *existing = shipment.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("shipment {}", shipment.id))),
        }
    }

    fn list_shipments(&self) -> Result<Vec<Shipment>, StoreError> {
        Ok(self.tables.read().shipments.values().cloned().collect())
    }

    fn save_threshold(&self, threshold: &SensorThreshold) -> Result<(), StoreError> {
        let key = (threshold.scope.shipment().cloned(), threshold.sensor_type.clone());
        self.tables.write().thresholds.insert(key, threshold.clone());
        Ok(())
    }

    fn load_threshold(
        &self,
        shipment_id: Option<&ShipmentId>,
        sensor_type: &SensorType,
    ) -> Result<Option<SensorThreshold>, StoreError> {
        let key = (shipment_id.cloned(), sensor_type.clone());
        Ok(self.tables.read().thresholds.get(&key).cloned())
    }

    fn save_reading(&self, reading: &StoredReading) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let index_key = (reading.reading.key(), reading.reading.id.clone());
        if tables.reading_index.contains_key(&index_key) {
            return Err(StoreError::Conflict(format!(
                "reading {} already stored",
                reading.reading.id
            )));
        }
        tables.append_reading(reading.clone());
        Ok(())
    }

    fn reading_exists(&self, key: &SensorKey, id: &ReadingId) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .reading_index
            .contains_key(&(key.clone(), id.clone())))
    }

    fn last_sequenced_timestamp(
        &self,
        key: &SensorKey,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.tables.read().watermarks.get(key).copied())
    }

    fn load_readings(
        &self,
        key: &SensorKey,
        range: TimeRange,
    ) -> Result<Vec<StoredReading>, StoreError> {
        let tables = self.tables.read();
        let mut readings: Vec<StoredReading> = tables
            .readings_by_key
            .get(key)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| &tables.readings[idx])
                    .filter(|r| range.contains(r.reading.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps ingestion order for equal timestamps
        readings.sort_by_key(|r| r.reading.timestamp);
        Ok(readings)
    }

    fn load_shipment_readings(
        &self,
        shipment_id: &ShipmentId,
        range: TimeRange,
    ) -> Result<Vec<StoredReading>, StoreError> {
        let tables = self.tables.read();
        let mut readings: Vec<StoredReading> = tables
            .readings
            .iter()
            .filter(|r| &r.reading.shipment_id == shipment_id)
            .filter(|r| range.contains(r.reading.timestamp))
            .cloned()
            .collect();

        readings.sort_by_key(|r| r.reading.timestamp);
        Ok(readings)
    }

    fn save_alert(&self, alert: &Alert) -> Result<AlertId, StoreError> {
        let mut tables = self.tables.write();
        let key = alert.key();

        if !alert.is_open() {
            return Err(StoreError::Conflict(format!(
                "new alert for {} must be open",
                key
            )));
        }
        if let Some(existing) = tables.open_alerts.get(&key) {
            return Err(StoreError::Conflict(format!(
                "{} already has open {}",
                key, existing
            )));
        }

        tables.next_alert_id += 1;
        let id = AlertId(tables.next_alert_id);
        let mut stored = alert.clone();
        stored.id = id;
        tables.insert_alert(stored);

        Ok(id)
    }

    fn update_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let key = alert.key();

        let existing = tables
            .alerts
            .get(&alert.id)
            .ok_or_else(|| StoreError::NotFound(alert.id.to_string()))?;
        if !existing.is_open() {
            return Err(StoreError::Conflict(format!("{} is already closed", alert.id)));
        }

        if alert.is_open() {
            tables.open_alerts.insert(key, alert.id);
        } else {
            tables.open_alerts.remove(&key);
        }
        tables.alerts.insert(alert.id, alert.clone());

        Ok(())
    }

    fn find_open_alert(&self, key: &SensorKey) -> Result<Option<Alert>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .open_alerts
            .get(key)
            .and_then(|id| tables.alerts.get(id))
            .cloned())
    }

    fn load_alerts(
        &self,
        shipment_id: &ShipmentId,
        range: TimeRange,
    ) -> Result<Vec<Alert>, StoreError> {
        let tables = self.tables.read();
        let mut alerts: Vec<Alert> = tables
            .alerts
            .values()
            .filter(|a| &a.shipment_id == shipment_id)
            .filter(|a| a.overlaps(range.from, range.to))
            .cloned()
            .collect();

        alerts.sort_by_key(|a| (a.opened_at, a.id));
        Ok(alerts)
    }

    fn open_alerts(&self, shipment_id: &ShipmentId) -> Result<Vec<Alert>, StoreError> {
        let tables = self.tables.read();
        let mut alerts: Vec<Alert> = tables
            .open_alerts
            .iter()
            .filter(|(key, _)| &key.shipment_id == shipment_id)
            .filter_map(|(_, id)| tables.alerts.get(id))
            .cloned()
            .collect();

        alerts.sort_by_key(|a| (a.opened_at, a.id));
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::data::{Disposition, Reading, Severity, Unit};
    use crate::thresholds::ThresholdScope;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 0).unwrap()
    }

    fn key() -> SensorKey {
        SensorKey::new("SHP-101".into(), "core_temperature".into())
    }

    fn stored(id: &str, minute: u32, disposition: Disposition) -> StoredReading {
        StoredReading {
            reading: Reading {
                id: id.into(),
                shipment_id: "SHP-101".into(),
                sensor_type: "core_temperature".into(),
                value: 5.0,
                unit: Unit::new("C"),
                timestamp: at(minute),
                location: None,
            },
            disposition,
            threshold: None,
            ingested_at: at(minute),
        }
    }

    fn compliant() -> Disposition {
        Disposition::Classified {
            classification: Classification::Compliant,
        }
    }

    #[test]
    fn test_shipment_crud() {
        let store = MemoryStore::new();
        let shipment = Shipment::new("SHP-101", "Mumbai", "Chennai");

        store.save_shipment(&shipment).unwrap();
        assert!(matches!(
            store.save_shipment(&shipment),
            Err(StoreError::Conflict(_))
        ));

        let mut loaded = store.load_shipment(&"SHP-101".into()).unwrap().unwrap();
        loaded.archived = true;
        store.update_shipment(&loaded).unwrap();
        assert!(store.load_shipment(&"SHP-101".into()).unwrap().unwrap().archived);

        let missing = Shipment::new("SHP-999", "A", "B");
        assert!(matches!(
            store.update_shipment(&missing),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list_shipments().unwrap().len(), 1);
    }

    #[test]
    fn test_threshold_exact_scope() {
        let store = MemoryStore::new();
        let default =
            SensorThreshold::new(ThresholdScope::Default, "core_temperature", 2.0, 8.0, "C");
        let overridden = SensorThreshold::new(
            ThresholdScope::Shipment("SHP-101".into()),
            "core_temperature",
            2.0,
            6.0,
            "C",
        );
        store.save_threshold(&default).unwrap();
        store.save_threshold(&overridden).unwrap();

        let sensor = SensorType::new("core_temperature");
        assert_eq!(store.load_threshold(None, &sensor).unwrap(), Some(default));
        assert_eq!(
            store
                .load_threshold(Some(&"SHP-101".into()), &sensor)
                .unwrap(),
            Some(overridden)
        );
        assert!(store
            .load_threshold(Some(&"SHP-102".into()), &sensor)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_readings_and_watermark() {
        let store = MemoryStore::new();
        store.save_reading(&stored("r1", 0, compliant())).unwrap();
        store.save_reading(&stored("r2", 10, compliant())).unwrap();
        store
            .save_reading(&stored(
                "r3",
                5,
                Disposition::OutOfOrder { watermark: at(10) },
            ))
            .unwrap();
        store
            .save_reading(&stored("r4", 20, Disposition::Unclassified))
            .unwrap();

        assert!(store.reading_exists(&key(), &"r1".into()).unwrap());
        assert!(matches!(
            store.save_reading(&stored("r1", 0, compliant())),
            Err(StoreError::Conflict(_))
        ));

        // The same id on another key is a different reading
        let mut humidity = stored("r1", 0, compliant());
        humidity.reading.sensor_type = "humidity".into();
        store.save_reading(&humidity).unwrap();
        let humidity_key = SensorKey::new("SHP-101".into(), "humidity".into());
        assert!(store.reading_exists(&humidity_key, &"r1".into()).unwrap());
        assert!(!store
            .reading_exists(&SensorKey::new("SHP-102".into(), "humidity".into()), &"r1".into())
            .unwrap());

        // Out-of-order and unclassified readings do not move the watermark
        assert_eq!(store.last_sequenced_timestamp(&key()).unwrap(), Some(at(10)));

        let all = store.load_readings(&key(), TimeRange::all()).unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.reading.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3", "r2", "r4"]);

        let window = store
            .load_readings(&key(), TimeRange::new(Some(at(5)), Some(at(20))))
            .unwrap();
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_single_open_alert_per_key() {
        let store = MemoryStore::new();
        let alert = Alert::open(&key(), Severity::Warning, "r1".into(), at(5), 1.0, 9.0);

        let id = store.save_alert(&alert).unwrap();
        assert_eq!(id, AlertId(1));
        assert!(matches!(
            store.save_alert(&alert),
            Err(StoreError::Conflict(_))
        ));

        let mut open = store.find_open_alert(&key()).unwrap().unwrap();
        assert_eq!(open.id, id);

        open.close(at(15));
        store.update_alert(&open).unwrap();
        assert!(store.find_open_alert(&key()).unwrap().is_none());

        // Closed alerts are terminal
        assert!(matches!(
            store.update_alert(&open),
            Err(StoreError::Conflict(_))
        ));

        // A fresh alert may open after closure
        let next = store.save_alert(&alert).unwrap();
        assert_eq!(next, AlertId(2));
        assert_eq!(store.load_alerts(&"SHP-101".into(), TimeRange::all()).unwrap().len(), 2);
        assert_eq!(store.open_alerts(&"SHP-101".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_rebuilds_indexes() {
        let store = MemoryStore::new();
        store.save_shipment(&Shipment::new("SHP-101", "A", "B")).unwrap();
        store.save_reading(&stored("r1", 0, compliant())).unwrap();
        let alert = Alert::open(&key(), Severity::Critical, "r1".into(), at(0), 4.0, 12.0);
        store.save_alert(&alert).unwrap();

        let restored = MemoryStore::from_snapshot(store.snapshot());
        assert!(restored.reading_exists(&key(), &"r1".into()).unwrap());
        assert_eq!(restored.last_sequenced_timestamp(&key()).unwrap(), Some(at(0)));
        assert!(restored.find_open_alert(&key()).unwrap().is_some());
        assert!(matches!(
            restored.save_alert(&alert),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(restored.alert_count(), 1);
        assert_eq!(restored.reading_count(), 1);
    }
}
