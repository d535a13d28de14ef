//! Threshold registry
//!
//! Admissible ranges per sensor type, optionally overridden per shipment, plus the
//! per-type warning band table used by the classifier. All of it is data loaded from
//! configuration; adding a sensor type or a shipment override needs no code change.

pub mod config;
pub mod registry;

pub use config::{SensorProfileConfig, ThresholdConfig};
pub use registry::{RegistryError, ThresholdRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{SensorType, ShipmentId, Unit};

/// Which readings a threshold applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdScope {
    /// Sensor-type default
    Default,
    /// Override for one shipment; takes precedence over the default
    Shipment(ShipmentId),
}

impl ThresholdScope {
    pub fn shipment(&self) -> Option<&ShipmentId> {
        match self {
            Self::Default => None,
            Self::Shipment(id) => Some(id),
        }
    }
}

impl fmt::Display for ThresholdScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Shipment(id) => write!(f, "shipment {}", id),
        }
    }
}

/// Admissible `[min, max]` range for a sensor type. Invariant: `min < max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorThreshold {
    pub scope: ThresholdScope,
    pub sensor_type: SensorType,
    pub min: f64,
    pub max: f64,
    pub unit: Unit,
}

impl SensorThreshold {
    pub fn new(
        scope: ThresholdScope,
        sensor_type: impl Into<SensorType>,
        min: f64,
        max: f64,
        unit: impl Into<Unit>,
    ) -> Self {
        Self {
            scope,
            sensor_type: sensor_type.into(),
            min,
            max,
            unit: unit.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// How far past a bound a value may stray and still be only a warning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WarningBand {
    /// Fixed distance in the threshold's unit
    Absolute(f64),
    /// Fraction of the range width (0.1 = 10%)
    RangeFraction(f64),
}

impl WarningBand {
    /// Band width in the threshold's unit
    pub fn width_for(&self, threshold: &SensorThreshold) -> f64 {
        match self {
            Self::Absolute(width) => width.max(0.0),
            Self::RangeFraction(fraction) => (threshold.width() * fraction).max(0.0),
        }
    }
}

impl Default for WarningBand {
    fn default() -> Self {
        Self::Absolute(0.0)
    }
}

/// Per-sensor-type classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub sensor_type: SensorType,
    pub unit: Unit,
    pub band: WarningBand,
}
