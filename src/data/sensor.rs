use serde::{Deserialize, Serialize};
use std::fmt;

use super::shipment::ShipmentId;

/// Sensor type identifier (e.g. `core_temperature`, `shock`)
///
/// Stored lower-cased and trimmed. Whether a type is recognized is decided by the
/// threshold configuration, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SensorType(String);

impl SensorType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SensorType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<SensorType> for String {
    fn from(sensor_type: SensorType) -> Self {
        sensor_type.0
    }
}

/// Measurement unit in canonical spelling
///
/// Aliases collapse to one spelling (`°C`, `c`, `celsius` all become `C`) so that
/// equality is a plain string compare. Units are never converted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Unit(String);

impl Unit {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(canonical_unit(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Unit {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Unit {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.0
    }
}

fn canonical_unit(raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "c" | "°c" | "degc" | "celsius" => "C".to_string(),
        "f" | "°f" | "degf" | "fahrenheit" => "F".to_string(),
        "%" | "pct" | "percent" | "%rh" | "rh" => "%".to_string(),
        "g" | "gforce" | "g-force" => "g".to_string(),
        "km" | "kilometers" | "kilometres" => "km".to_string(),
        "v" | "volt" | "volts" => "V".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Alert state key: one lifecycle per (shipment, sensor type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorKey {
    pub shipment_id: ShipmentId,
    pub sensor_type: SensorType,
}

impl SensorKey {
    pub fn new(shipment_id: ShipmentId, sensor_type: SensorType) -> Self {
        Self {
            shipment_id,
            sensor_type,
        }
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shipment_id, self.sensor_type)
    }
}
