//! Read-side projections for dashboards and reports

pub mod service;
pub mod summary;

pub use service::{CurrentStatus, QueryError, QueryService, SensorSnapshot};
pub use summary::{risk_score, summarize, RiskLevel, SensorSummary, ShipmentSummary};
