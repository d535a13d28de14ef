//! Threshold configuration file
//!
//! JSON document listing the recognized sensor types with their default ranges and
//! warning bands, plus optional per-shipment overrides.
//!
//! ```json
//! {
//!   "profiles": [
//!     {"sensor_type": "core_temperature", "unit": "C", "min": 2, "max": 8,
//!      "band": {"kind": "absolute", "value": 1}}
//!   ],
//!   "overrides": [
//!     {"scope": {"shipment": "SHP-104"}, "sensor_type": "core_temperature",
//!      "min": 2, "max": 6, "unit": "C"}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{SensorProfile, SensorThreshold, ThresholdScope, WarningBand};
use crate::config::ConfigError;
use crate::data::{SensorType, Unit};

/// Whole threshold configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub profiles: Vec<SensorProfileConfig>,
    #[serde(default)]
    pub overrides: Vec<SensorThreshold>,
}

/// One recognized sensor type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfileConfig {
    pub sensor_type: SensorType,
    pub unit: Unit,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub band: WarningBand,
}

impl SensorProfileConfig {
    pub fn new(sensor_type: &str, unit: &str, min: f64, max: f64, band: WarningBand) -> Self {
        Self {
            sensor_type: SensorType::new(sensor_type),
            unit: Unit::new(unit),
            min,
            max,
            band,
        }
    }

    pub fn profile(&self) -> SensorProfile {
        SensorProfile {
            sensor_type: self.sensor_type.clone(),
            unit: self.unit.clone(),
            band: self.band,
        }
    }

    pub fn default_threshold(&self) -> SensorThreshold {
        SensorThreshold {
            scope: ThresholdScope::Default,
            sensor_type: self.sensor_type.clone(),
            min: self.min,
            max: self.max,
            unit: self.unit.clone(),
        }
    }
}

impl ThresholdConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in sensor catalogue for cold-chain medical shipments
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                SensorProfileConfig::new("core_temperature", "C", 2.0, 8.0, WarningBand::Absolute(1.0)),
                SensorProfileConfig::new("surface_temperature", "C", 0.0, 10.0, WarningBand::Absolute(2.0)),
                SensorProfileConfig::new("humidity", "%", 30.0, 60.0, WarningBand::Absolute(5.0)),
                // Any shock above the spike level is critical
                SensorProfileConfig::new("shock", "g", 0.0, 2.0, WarningBand::Absolute(0.0)),
                SensorProfileConfig::new("route_deviation", "km", 0.0, 5.0, WarningBand::RangeFraction(0.1)),
                SensorProfileConfig::new("battery_voltage", "V", 3.3, 4.2, WarningBand::Absolute(0.3)),
            ],
            overrides: Vec::new(),
        }
    }

    /// Check every range and that overrides name a configured sensor type
    pub fn validate(&self) -> Result<(), ConfigError> {
        for profile in &self.profiles {
            if profile.sensor_type.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "profiles.sensor_type".to_string(),
                    message: "sensor type must not be empty".to_string(),
                });
            }
            if !profile.default_threshold().is_valid() {
                return Err(ConfigError::InvalidValue {
                    key: format!("profiles.{}", profile.sensor_type),
                    message: format!("min {} must be below max {}", profile.min, profile.max),
                });
            }
        }

        for threshold in &self.overrides {
            if !self.profiles.iter().any(|p| p.sensor_type == threshold.sensor_type) {
                return Err(ConfigError::InvalidValue {
                    key: format!("overrides.{}", threshold.sensor_type),
                    message: "no profile for this sensor type".to_string(),
                });
            }
            if !threshold.is_valid() {
                return Err(ConfigError::InvalidValue {
                    key: format!("overrides.{}", threshold.sensor_type),
                    message: format!("min {} must be below max {}", threshold.min, threshold.max),
                });
            }
        }

        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self::builtin()
    }
}
