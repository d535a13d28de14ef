//! Alert lifecycle state machine
//!
//! Each (shipment, sensor type) key is either Clear or has exactly one open alert.
//! The state is never cached here: every transition starts from `find_open_alert`,
//! so it survives restarts and is shared by every process using the same store.
//!
//! Callers must serialize `apply` per key; see [`crate::monitor::Monitor`]. Alert
//! writes of different keys on one shipment are serialized here, so a closing
//! Critical alert always sees the final state of its siblings when it decides
//! whether the shipment is compromised.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::classify::Classification;
use crate::data::{Alert, AlertId, Reading, Severity, ShipmentId, ShipmentStatus};
use crate::storage::{with_backoff, RetryPolicy, Store, StoreError};

/// What a reading did to its key's alert state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// Compliant with no open alert, or a reading the open alert already holds
    None,
    Opened { alert: Alert },
    Extended { alert: Alert },
    Escalated { alert: Alert, from: Severity },
    /// `compromised` is set when this closure marked the shipment compromised
    Closed { alert: Alert, compromised: bool },
}

impl Transition {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            Self::None => None,
            Self::Opened { alert }
            | Self::Extended { alert }
            | Self::Escalated { alert, .. }
            | Self::Closed { alert, .. } => Some(alert),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Opened { .. } => "opened",
            Self::Extended { .. } => "extended",
            Self::Escalated { .. } => "escalated",
            Self::Closed { .. } => "closed",
        }
    }
}

/// Drives alert transitions from classified readings
pub struct AlertLifecycleManager {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    shipments: DashMap<ShipmentId, Arc<Mutex<()>>>,
}

impl AlertLifecycleManager {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            shipments: DashMap::new(),
        }
    }

    async fn lock_shipment(&self, id: &ShipmentId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.shipments.entry(id.clone()).or_default().value());
        lock.lock_owned().await
    }

    /// Drop the shipment's lock unless a transition is holding or awaiting it
    pub fn forget(&self, id: &ShipmentId) {
        self.shipments
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Apply one classified reading to its key's alert state
    pub async fn apply(
        &self,
        reading: &Reading,
        classification: Classification,
    ) -> Result<Transition, StoreError> {
        let key = reading.key();
        let _shipment = self.lock_shipment(&key.shipment_id).await;

        let open = with_backoff(&self.retry, "find_open_alert", || {
            self.store.find_open_alert(&key)
        })
        .await?;

        match (open, classification.severity()) {
            (None, None) => Ok(Transition::None),

            (None, Some(severity)) => {
                let mut alert = Alert::open(
                    &key,
                    severity,
                    reading.id.clone(),
                    reading.timestamp,
                    classification.margin(),
                    reading.value,
                );
                let id = with_backoff(&self.retry, "save_alert", || self.store.save_alert(&alert))
                    .await?;
                alert.id = id;

                tracing::info!(
                    alert_id = %alert.id,
                    key = %key,
                    severity = %severity,
                    value = reading.value,
                    "Alert opened"
                );
                Ok(Transition::Opened { alert })
            }

            // Redelivery of a reading this alert already absorbed
            (Some(alert), _) if alert.contains_reading(&reading.id) => Ok(Transition::None),

            (Some(mut alert), Some(severity)) => {
                let from = alert.severity;
                let escalated = alert.extend(
                    reading.id.clone(),
                    severity,
                    classification.margin(),
                    reading.value,
                );
                with_backoff(&self.retry, "update_alert", || self.store.update_alert(&alert))
                    .await?;

                if escalated {
                    tracing::warn!(
                        alert_id = %alert.id,
                        key = %key,
                        from = %from,
                        to = %alert.severity,
                        "Alert escalated"
                    );
                    Ok(Transition::Escalated { alert, from })
                } else {
                    tracing::debug!(alert_id = %alert.id, key = %key, "Alert extended");
                    Ok(Transition::Extended { alert })
                }
            }

            (Some(mut alert), None) => {
                alert.close(reading.timestamp);

                // Shipment first: if the alert update then fails, a redelivery still
                // finds the alert open and repeats both steps.
                let compromised = self.settle_shipment(&alert).await?;
                with_backoff(&self.retry, "update_alert", || self.store.update_alert(&alert))
                    .await?;

                tracing::info!(
                    alert_id = %alert.id,
                    key = %key,
                    severity = %alert.severity,
                    peak_margin = alert.peak_margin,
                    readings = alert.triggering_readings.len(),
                    compromised,
                    "Alert closed"
                );
                Ok(Transition::Closed { alert, compromised })
            }
        }
    }

    /// Mark the shipment compromised when a Critical alert closes and no other
    /// Critical alert is still open on it
    async fn settle_shipment(&self, closing: &Alert) -> Result<bool, StoreError> {
        if closing.severity != Severity::Critical {
            return Ok(false);
        }

        let open = with_backoff(&self.retry, "open_alerts", || {
            self.store.open_alerts(&closing.shipment_id)
        })
        .await?;
        if has_other_open_critical(&open, closing.id) {
            return Ok(false);
        }

        let shipment = with_backoff(&self.retry, "load_shipment", || {
            self.store.load_shipment(&closing.shipment_id)
        })
        .await?;
        let Some(mut shipment) = shipment else {
            tracing::warn!(shipment_id = %closing.shipment_id, "Closed alert for unknown shipment");
            return Ok(false);
        };

        if shipment.status != ShipmentStatus::Compromised {
            shipment.status = ShipmentStatus::Compromised;
            with_backoff(&self.retry, "update_shipment", || {
                self.store.update_shipment(&shipment)
            })
            .await?;
            tracing::warn!(
                shipment_id = %shipment.id,
                alert_id = %closing.id,
                "Shipment marked compromised"
            );
        }
        Ok(true)
    }
}

fn has_other_open_critical(open: &[Alert], closing: AlertId) -> bool {
    open.iter()
        .any(|a| a.id != closing && a.severity == Severity::Critical)
}
