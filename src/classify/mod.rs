//! Violation classifier
//!
//! Pure and stateless: a value inside `[min, max]` is compliant, a value past a bound
//! by at most the sensor type's warning band is a warning, anything further is
//! critical. The band comes from the per-type table in the threshold registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::data::{Reading, Severity};
use crate::thresholds::{SensorThreshold, ThresholdRegistry, WarningBand};

/// Outcome of classifying one reading
///
/// `margin` is the signed distance from the nearest bound: positive above `max`,
/// negative below `min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Classification {
    Compliant,
    Warning { margin: f64 },
    Critical { margin: f64 },
}

impl Classification {
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::Compliant => None,
            Self::Warning { .. } => Some(Severity::Warning),
            Self::Critical { .. } => Some(Severity::Critical),
        }
    }

    pub fn margin(&self) -> f64 {
        match self {
            Self::Compliant => 0.0,
            Self::Warning { margin } | Self::Critical { margin } => *margin,
        }
    }

    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Compliant)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compliant => write!(f, "compliant"),
            Self::Warning { margin } => write!(f, "warning ({:+.2})", margin),
            Self::Critical { margin } => write!(f, "critical ({:+.2})", margin),
        }
    }
}

/// Classify a value against a threshold with the given warning band
pub fn classify_value(value: f64, threshold: &SensorThreshold, band: WarningBand) -> Classification {
    let margin = if value > threshold.max {
        value - threshold.max
    } else if value < threshold.min {
        value - threshold.min
    } else {
        return Classification::Compliant;
    };

    if margin.abs() <= band.width_for(threshold) {
        Classification::Warning { margin }
    } else {
        Classification::Critical { margin }
    }
}

/// Classifier bound to the registry's per-type band table
#[derive(Clone)]
pub struct ViolationClassifier {
    registry: Arc<ThresholdRegistry>,
}

impl ViolationClassifier {
    pub fn new(registry: Arc<ThresholdRegistry>) -> Self {
        Self { registry }
    }

    pub fn classify(&self, reading: &Reading, threshold: &SensorThreshold) -> Classification {
        let band = self.registry.band(&reading.sensor_type);
        classify_value(reading.value, threshold, band)
    }
}
