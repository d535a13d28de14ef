//! Ingestion pipeline
//!
//! [`Monitor`] wires validation, threshold resolution, classification, the alert
//! lifecycle and persistence together:
//!
//! ```text
//! parse -> shipment check -> resolve threshold -> unit check
//!       -> [key lock] dedup -> ordering check -> classify -> lifecycle
//!       -> save reading -> notify
//! ```
//!
//! Readings for one (shipment, sensor type) key run one at a time under that key's
//! lock; different keys only meet in the lifecycle's short per-shipment section.
//! Ingest holds its shipment's gate shared from the shipment check to the commit and
//! administrative updates hold it exclusively, so no reading lands after a delivery
//! or archive it was not checked against. The reading row is written last
//! and acts as the commit marker for the reading id: until it exists, a redelivery
//! is processed again and the lifecycle skips work the alert already holds.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::alerts::{AlertLifecycleManager, Notifier, Transition};
use crate::classify::{Classification, ViolationClassifier};
use crate::data::{
    Disposition, RawReading, Reading, ReadingId, SensorKey, SensorType, Shipment, ShipmentId,
    ShipmentStatus, StoredReading,
};
use crate::ingest::{ReadingValidator, RejectionReason};
use crate::storage::{with_backoff, RetryPolicy, Store, StoreError};
use crate::thresholds::{RegistryError, SensorThreshold, ThresholdRegistry};

/// Result of ingesting one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Classified and applied to the alert lifecycle
    Processed {
        reading_id: ReadingId,
        classification: Classification,
        transition: Transition,
    },
    /// Reading id already stored; nothing changed
    Duplicate { reading_id: ReadingId },
    /// Stored without classification because no threshold resolved
    Unclassified { reading_id: ReadingId },
    /// Stored but older than the key's last sequenced reading
    OutOfOrder {
        reading_id: ReadingId,
        watermark: DateTime<Utc>,
    },
}

impl IngestOutcome {
    pub fn reading_id(&self) -> &ReadingId {
        match self {
            Self::Processed { reading_id, .. }
            | Self::Duplicate { reading_id }
            | Self::Unclassified { reading_id }
            | Self::OutOfOrder { reading_id, .. } => reading_id,
        }
    }
}

/// Why a reading could not be ingested
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("Reading rejected: {0}")]
    Validation(#[from] RejectionReason),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Per-key ordering state, rebuilt from the store on first use
#[derive(Debug, Default)]
struct KeyState {
    loaded: bool,
    watermark: Option<DateTime<Utc>>,
}

/// Reading pipeline and shipment administration over one store
pub struct Monitor {
    store: Arc<dyn Store>,
    registry: Arc<ThresholdRegistry>,
    validator: ReadingValidator,
    classifier: ViolationClassifier,
    lifecycle: AlertLifecycleManager,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
    keys: DashMap<SensorKey, Arc<Mutex<KeyState>>>,
    gates: DashMap<ShipmentId, Arc<RwLock<()>>>,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ThresholdRegistry>,
        notifier: Notifier,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            validator: ReadingValidator::new(Arc::clone(&registry)),
            classifier: ViolationClassifier::new(Arc::clone(&registry)),
            lifecycle: AlertLifecycleManager::new(Arc::clone(&store), retry),
            notifier: Arc::new(notifier),
            store,
            registry,
            retry,
            keys: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<ThresholdRegistry> {
        Arc::clone(&self.registry)
    }

    /// Ingest one raw reading
    pub async fn ingest(&self, raw: RawReading) -> Result<IngestOutcome, IngestError> {
        let result = self.ingest_inner(&raw).await;
        if let Err(e) = &result {
            match e {
                IngestError::Validation(reason) => tracing::warn!(
                    shipment_id = %raw.shipment_id,
                    sensor_type = %raw.sensor_type,
                    reason = %reason,
                    "Reading rejected"
                ),
                IngestError::Persistence(err) => tracing::error!(
                    shipment_id = %raw.shipment_id,
                    sensor_type = %raw.sensor_type,
                    error = %err,
                    "Reading ingestion failed"
                ),
            }
        }
        result
    }

    async fn ingest_inner(&self, raw: &RawReading) -> Result<IngestOutcome, IngestError> {
        let reading = self.validator.parse(raw)?;

        let gate = self.gate(&reading.shipment_id);
        let _admitted = gate.read().await;

        let shipment = with_backoff(&self.retry, "load_shipment", || {
            self.store.load_shipment(&reading.shipment_id)
        })
        .await?;
        self.validator.check_shipment(&reading, shipment.as_ref())?;

        let threshold = self.resolve_threshold(&reading).await?;
        self.validator.check_unit(&reading, threshold.as_ref())?;

        let lock = Arc::clone(self.keys.entry(reading.key()).or_default().value());
        let mut state = lock.lock().await;

        let result = self.process(&mut state, reading, threshold).await;
        if result.is_err() {
            // Partial writes may have happened; rebuild from the store next time
            state.loaded = false;
        }
        result
    }

    async fn process(
        &self,
        state: &mut KeyState,
        reading: Reading,
        threshold: Option<SensorThreshold>,
    ) -> Result<IngestOutcome, IngestError> {
        let key = reading.key();
        let exists = with_backoff(&self.retry, "reading_exists", || {
            self.store.reading_exists(&key, &reading.id)
        })
        .await?;
        if exists {
            tracing::debug!(reading_id = %reading.id, "Duplicate reading ignored");
            return Ok(IngestOutcome::Duplicate {
                reading_id: reading.id,
            });
        }

        if !state.loaded {
            state.watermark = with_backoff(&self.retry, "last_sequenced_timestamp", || {
                self.store.last_sequenced_timestamp(&key)
            })
            .await?;
            state.loaded = true;
        }

        let Some(threshold) = threshold else {
            tracing::warn!(
                reading_id = %reading.id,
                shipment_id = %reading.shipment_id,
                sensor_type = %reading.sensor_type,
                "No threshold configured, reading stored unclassified"
            );
            let reading_id = reading.id.clone();
            let stored = self.commit(reading, Disposition::Unclassified, None).await?;
            return Ok(if stored {
                IngestOutcome::Unclassified { reading_id }
            } else {
                IngestOutcome::Duplicate { reading_id }
            });
        };

        if let Some(watermark) = state.watermark.filter(|w| reading.timestamp < *w) {
            tracing::warn!(
                reading_id = %reading.id,
                key = %reading.key(),
                timestamp = %reading.timestamp,
                watermark = %watermark,
                "Out-of-order reading stored without lifecycle processing"
            );
            let reading_id = reading.id.clone();
            let stored = self
                .commit(reading, Disposition::OutOfOrder { watermark }, Some(threshold))
                .await?;
            return Ok(if stored {
                IngestOutcome::OutOfOrder {
                    reading_id,
                    watermark,
                }
            } else {
                IngestOutcome::Duplicate { reading_id }
            });
        }

        let classification = self.classifier.classify(&reading, &threshold);
        let transition = self.lifecycle.apply(&reading, classification).await?;

        let reading_id = reading.id.clone();
        let timestamp = reading.timestamp;
        let stored = self
            .commit(reading, Disposition::Classified { classification }, Some(threshold))
            .await?;
        if !stored {
            return Ok(IngestOutcome::Duplicate { reading_id });
        }
        state.watermark = Some(timestamp);

        tracing::debug!(
            reading_id = %reading_id,
            classification = %classification,
            transition = transition.name(),
            "Reading processed"
        );

        if Notifier::is_notable(&transition) {
            let notifier = Arc::clone(&self.notifier);
            let notice = transition.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&notice).await {
                    tracing::warn!(error = %e, "Alert notification failed");
                }
            });
        }

        Ok(IngestOutcome::Processed {
            reading_id,
            classification,
            transition,
        })
    }

    /// Persist the reading; false when another writer stored the id first
    async fn commit(
        &self,
        reading: Reading,
        disposition: Disposition,
        threshold: Option<SensorThreshold>,
    ) -> Result<bool, StoreError> {
        let stored = StoredReading {
            reading,
            disposition,
            threshold,
            ingested_at: Utc::now(),
        };

        match with_backoff(&self.retry, "save_reading", || self.store.save_reading(&stored)).await
        {
            Ok(()) => Ok(true),
            Err(StoreError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn resolve_threshold(
        &self,
        reading: &Reading,
    ) -> Result<Option<SensorThreshold>, IngestError> {
        let resolved = with_backoff(&self.retry, "resolve_threshold", || {
            self.registry
                .resolve(&reading.shipment_id, &reading.sensor_type)
        })
        .await;

        match resolved {
            Ok(threshold) => Ok(Some(threshold)),
            Err(RegistryError::NotFound { .. }) => Ok(None),
            Err(RegistryError::Store(e)) => Err(IngestError::Persistence(e)),
            Err(RegistryError::UnknownSensorType(t)) => {
                Err(RejectionReason::UnknownSensorType(t.to_string()).into())
            }
            Err(RegistryError::InvalidRange { min, max }) => Err(IngestError::Persistence(
                StoreError::Serialization(format!("stored threshold has invalid range {min}..{max}")),
            )),
        }
    }

    /// Ingest many readings. Readings of one key keep their relative order; keys
    /// are processed concurrently. Results come back in input order.
    pub async fn ingest_batch(
        &self,
        raws: Vec<RawReading>,
    ) -> Vec<Result<IngestOutcome, IngestError>> {
        let total = raws.len();
        let mut groups: HashMap<SensorKey, Vec<(usize, RawReading)>> = HashMap::new();
        for (index, raw) in raws.into_iter().enumerate() {
            let key = SensorKey::new(
                ShipmentId::new(raw.shipment_id.as_str()),
                SensorType::new(&raw.sensor_type),
            );
            groups.entry(key).or_default().push((index, raw));
        }

        let tasks = groups.into_values().map(|group| async move {
            let mut results = Vec::with_capacity(group.len());
            for (index, raw) in group {
                results.push((index, self.ingest(raw).await));
            }
            results
        });

        let mut slots: Vec<Option<Result<IngestOutcome, IngestError>>> =
            (0..total).map(|_| None).collect();
        for (index, result) in join_all(tasks).await.into_iter().flatten() {
            slots[index] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }

    // Administration

    /// Register a new in-transit shipment
    pub async fn register_shipment(&self, mut shipment: Shipment) -> Result<Shipment, StoreError> {
        shipment.status = ShipmentStatus::InTransit;
        shipment.archived = false;
        with_backoff(&self.retry, "save_shipment", || self.store.save_shipment(&shipment)).await?;
        tracing::info!(
            shipment_id = %shipment.id,
            origin = %shipment.origin,
            destination = %shipment.destination,
            "Shipment registered"
        );
        Ok(shipment)
    }

    /// Record arrival. A compromised shipment keeps its status.
    pub async fn mark_delivered(
        &self,
        id: &ShipmentId,
        at: Option<DateTime<Utc>>,
    ) -> Result<Shipment, StoreError> {
        let shipment = self
            .modify_shipment(id, |s| {
                s.actual_arrival = Some(at.unwrap_or_else(Utc::now));
                if s.status != ShipmentStatus::Compromised {
                    s.status = ShipmentStatus::Delivered;
                }
                Ok(())
            })
            .await?;
        self.forget_shipment(id);
        tracing::info!(shipment_id = %id, status = %shipment.status, "Shipment delivered");
        Ok(shipment)
    }

    /// Hide a shipment from ingest; its history stays queryable
    pub async fn archive_shipment(&self, id: &ShipmentId) -> Result<Shipment, StoreError> {
        let shipment = self
            .modify_shipment(id, |s| {
                s.archived = true;
                Ok(())
            })
            .await?;
        self.forget_shipment(id);
        tracing::info!(shipment_id = %id, "Shipment archived");
        Ok(shipment)
    }

    /// Operator override clearing a compromised status
    pub async fn restore_in_transit(&self, id: &ShipmentId) -> Result<Shipment, StoreError> {
        let shipment = self
            .modify_shipment(id, |s| {
                if s.is_terminal() {
                    return Err(StoreError::Conflict(format!(
                        "shipment {} is delivered or archived",
                        s.id
                    )));
                }
                s.status = ShipmentStatus::InTransit;
                Ok(())
            })
            .await?;
        tracing::info!(shipment_id = %id, "Shipment restored to in-transit");
        Ok(shipment)
    }

    /// Insert or replace a threshold; affects readings ingested from now on
    pub async fn set_threshold(&self, threshold: SensorThreshold) -> Result<(), RegistryError> {
        with_backoff(&self.retry, "set_threshold", || {
            self.registry.set_threshold(threshold.clone())
        })
        .await
    }

    fn gate(&self, id: &ShipmentId) -> Arc<RwLock<()>> {
        Arc::clone(self.gates.entry(id.clone()).or_default().value())
    }

    async fn modify_shipment<F>(&self, id: &ShipmentId, change: F) -> Result<Shipment, StoreError>
    where
        F: Fn(&mut Shipment) -> Result<(), StoreError>,
    {
        let gate = self.gate(id);
        let _exclusive = gate.write().await;

        let mut shipment = with_backoff(&self.retry, "load_shipment", || {
            self.store.load_shipment(id)
        })
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("shipment {}", id)))?;

        change(&mut shipment)?;
        with_backoff(&self.retry, "update_shipment", || {
            self.store.update_shipment(&shipment)
        })
        .await?;
        Ok(shipment)
    }

    /// Drop cached locks for a shipment that no longer takes readings. Locks still
    /// held by an in-flight ingest are kept.
    fn forget_shipment(&self, id: &ShipmentId) {
        self.keys
            .retain(|key, lock| &key.shipment_id != id || Arc::strong_count(lock) > 1);
        self.gates
            .remove_if(id, |_, gate| Arc::strong_count(gate) == 1);
        self.lifecycle.forget(id);
    }
}
