use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::config::ThresholdConfig;
use super::{SensorProfile, SensorThreshold, ThresholdScope, WarningBand};
use crate::data::{SensorType, ShipmentId};
use crate::storage::{Retryable, Store, StoreError};

/// Resolves the applicable threshold for a (shipment, sensor type)
///
/// Sensor profiles (recognized types and warning bands) are held in memory; the
/// threshold rows themselves live in the store so every process resolves the same
/// range and edits survive restarts.
pub struct ThresholdRegistry {
    store: Arc<dyn Store>,
    profiles: RwLock<HashMap<SensorType, SensorProfile>>,
}

impl ThresholdRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Install profiles and seed default and override thresholds from configuration
    pub fn from_config(store: Arc<dyn Store>, config: &ThresholdConfig) -> Result<Self, RegistryError> {
        let registry = Self::new(store);

        for profile in &config.profiles {
            registry.register_profile(profile.profile());
            // Keep edits made at runtime over the configured default
            let existing = registry
                .store
                .load_threshold(None, &profile.sensor_type)?;
            if existing.is_none() {
                registry.set_threshold(profile.default_threshold())?;
            }
        }

        for threshold in &config.overrides {
            registry.set_threshold(threshold.clone())?;
        }

        tracing::info!(
            profiles = config.profiles.len(),
            overrides = config.overrides.len(),
            "Threshold registry loaded"
        );

        Ok(registry)
    }

    /// Add or replace a sensor profile
    pub fn register_profile(&self, profile: SensorProfile) {
        self.profiles
            .write()
            .insert(profile.sensor_type.clone(), profile);
    }

    pub fn is_recognized(&self, sensor_type: &SensorType) -> bool {
        self.profiles.read().contains_key(sensor_type)
    }

    pub fn profile(&self, sensor_type: &SensorType) -> Option<SensorProfile> {
        self.profiles.read().get(sensor_type).cloned()
    }

    /// Warning band for a sensor type; unknown types get a zero band
    pub fn band(&self, sensor_type: &SensorType) -> WarningBand {
        self.profiles
            .read()
            .get(sensor_type)
            .map(|p| p.band)
            .unwrap_or_default()
    }

    pub fn sensor_types(&self) -> Vec<SensorType> {
        let mut types: Vec<SensorType> = self.profiles.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Shipment override first, then the sensor-type default
    pub fn resolve(
        &self,
        shipment_id: &ShipmentId,
        sensor_type: &SensorType,
    ) -> Result<SensorThreshold, RegistryError> {
        if let Some(threshold) = self.store.load_threshold(Some(shipment_id), sensor_type)? {
            return Ok(threshold);
        }
        if let Some(threshold) = self.store.load_threshold(None, sensor_type)? {
            return Ok(threshold);
        }

        Err(RegistryError::NotFound {
            shipment_id: shipment_id.clone(),
            sensor_type: sensor_type.clone(),
        })
    }

    /// Insert or replace a threshold. Applies to readings evaluated from now on;
    /// stored readings keep the threshold they were judged against.
    pub fn set_threshold(&self, threshold: SensorThreshold) -> Result<(), RegistryError> {
        if !self.is_recognized(&threshold.sensor_type) {
            return Err(RegistryError::UnknownSensorType(threshold.sensor_type));
        }
        if !threshold.is_valid() {
            return Err(RegistryError::InvalidRange {
                min: threshold.min,
                max: threshold.max,
            });
        }

        self.store.save_threshold(&threshold)?;

        tracing::info!(
            scope = %threshold.scope,
            sensor_type = %threshold.sensor_type,
            min = threshold.min,
            max = threshold.max,
            unit = %threshold.unit,
            "Threshold updated"
        );
        Ok(())
    }

    /// Convenience for a shipment-specific override
    pub fn set_override(
        &self,
        shipment_id: ShipmentId,
        sensor_type: SensorType,
        min: f64,
        max: f64,
    ) -> Result<(), RegistryError> {
        let unit = self
            .profile(&sensor_type)
            .map(|p| p.unit)
            .ok_or_else(|| RegistryError::UnknownSensorType(sensor_type.clone()))?;

        self.set_threshold(SensorThreshold {
            scope: ThresholdScope::Shipment(shipment_id),
            sensor_type,
            min,
            max,
            unit,
        })
    }
}

/// Threshold registry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("No threshold for sensor '{sensor_type}' on shipment {shipment_id}")]
    NotFound {
        shipment_id: ShipmentId,
        sensor_type: SensorType,
    },

    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(SensorType),

    #[error("Invalid threshold range: min {min} must be below max {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Retryable for RegistryError {
    fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Store(e) if e.is_transient())
    }
}
