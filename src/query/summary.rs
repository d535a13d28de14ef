//! Shipment risk summary

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::Classification;
use crate::data::{Alert, Disposition, SensorType, Shipment, ShipmentId, ShipmentStatus, StoredReading};

const WARNING_WEIGHT: f64 = 0.1;
const CRITICAL_WEIGHT: f64 = 0.35;

/// Risk bucket for a sensor or a whole shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket for an overall risk score
    pub fn from_score(score: f64) -> Self {
        if score > 0.5 {
            Self::High
        } else if score > 0.2 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Statistics for one sensor type over classified readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub sensor_type: SensorType,
    pub readings: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub warnings: usize,
    pub criticals: usize,
    pub risk: RiskLevel,
}

/// Per-shipment report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentSummary {
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub total_readings: usize,
    pub unclassified_readings: usize,
    pub out_of_order_readings: usize,
    pub sensors: Vec<SensorSummary>,
    /// 0.1 per warning reading plus 0.35 per critical reading, capped at 1
    pub risk_score: f64,
    pub risk_category: RiskLevel,
    /// Sensor types whose own risk is High
    pub critical_sensors: Vec<SensorType>,
    pub alerts_total: usize,
    pub alerts_open: usize,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    warnings: usize,
    criticals: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64, classification: &Classification) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;

        match classification {
            Classification::Warning { .. } => self.warnings += 1,
            Classification::Critical { .. } => self.criticals += 1,
            Classification::Compliant => {}
        }
    }

    fn risk(&self) -> RiskLevel {
        if self.criticals > 0 {
            RiskLevel::High
        } else if self.warnings > 0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn finish(self, sensor_type: SensorType) -> SensorSummary {
        SensorSummary {
            risk: self.risk(),
            sensor_type,
            readings: self.count,
            average: round_to(self.sum / self.count as f64, 2),
            min: self.min,
            max: self.max,
            warnings: self.warnings,
            criticals: self.criticals,
        }
    }
}

/// Overall score from violation counts, capped at 1 and rounded to 3 decimals
pub fn risk_score(warnings: usize, criticals: usize) -> f64 {
    let score = warnings as f64 * WARNING_WEIGHT + criticals as f64 * CRITICAL_WEIGHT;
    round_to(score.min(1.0), 3)
}

/// Build the summary from a consistent set of readings and alerts
pub fn summarize(shipment: &Shipment, readings: &[StoredReading], alerts: &[Alert]) -> ShipmentSummary {
    let mut per_sensor: BTreeMap<SensorType, Accumulator> = BTreeMap::new();
    let mut unclassified = 0;
    let mut out_of_order = 0;

    for stored in readings {
        match &stored.disposition {
            Disposition::Classified { classification } => per_sensor
                .entry(stored.reading.sensor_type.clone())
                .or_default()
                .add(stored.reading.value, classification),
            Disposition::Unclassified => unclassified += 1,
            Disposition::OutOfOrder { .. } => out_of_order += 1,
        }
    }

    let sensors: Vec<SensorSummary> = per_sensor
        .into_iter()
        .map(|(sensor_type, acc)| acc.finish(sensor_type))
        .collect();

    let warnings: usize = sensors.iter().map(|s| s.warnings).sum();
    let criticals: usize = sensors.iter().map(|s| s.criticals).sum();
    let score = risk_score(warnings, criticals);

    let critical_sensors = sensors
        .iter()
        .filter(|s| s.risk == RiskLevel::High)
        .map(|s| s.sensor_type.clone())
        .collect();

    ShipmentSummary {
        shipment_id: shipment.id.clone(),
        status: shipment.status,
        total_readings: readings.len(),
        unclassified_readings: unclassified,
        out_of_order_readings: out_of_order,
        sensors,
        risk_score: score,
        risk_category: RiskLevel::from_score(score),
        critical_sensors,
        alerts_total: alerts.len(),
        alerts_open: alerts.iter().filter(|a| a.is_open()).count(),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
