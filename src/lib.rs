//! MediSafe: threshold-violation detection for in-transit medical shipments
//!
//! Sensor readings (temperature, humidity, shock, route deviation, battery) are
//! validated, classified against per-shipment or per-type thresholds and folded
//! into a per-(shipment, sensor type) alert lifecycle. A Critical alert that closes
//! marks its shipment compromised.
//!
//! # Features
//!
//! - **Threshold Registry**: Type defaults with shipment overrides, configured as data
//! - **Violation Classifier**: Table-driven warning bands per sensor type
//! - **Alert Lifecycle**: At most one open alert per key, idempotent by reading id
//! - **Restart Safety**: All lifecycle state is rebuilt from the store
//! - **Queries**: Current status, alert history, reading series, risk summary
//!
//! # Example
//!
//! ```no_run
//! use medisafe::alerts::Notifier;
//! use medisafe::data::{RawReading, Shipment};
//! use medisafe::monitor::Monitor;
//! use medisafe::storage::{MemoryStore, RetryPolicy, Store};
//! use medisafe::thresholds::{ThresholdConfig, ThresholdRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
//! let registry = Arc::new(ThresholdRegistry::from_config(
//!     Arc::clone(&store),
//!     &ThresholdConfig::builtin(),
//! )?);
//! let monitor = Monitor::new(store, registry, Notifier::log_only(), RetryPolicy::default());
//!
//! monitor
//!     .register_shipment(Shipment::new("SHP-101", "Mumbai", "Chennai"))
//!     .await?;
//!
//! let outcome = monitor
//!     .ingest(RawReading {
//!         shipment_id: "SHP-101".to_string(),
//!         sensor_type: "core_temperature".to_string(),
//!         value: Some(9.0),
//!         unit: "C".to_string(),
//!         timestamp: Some("2024-01-01T10:05:00Z".to_string()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod classify;
pub mod config;
pub mod data;
pub mod ingest;
pub mod monitor;
pub mod query;
pub mod storage;
pub mod thresholds;

// Re-export commonly used types
pub use classify::Classification;
pub use data::{Alert, RawReading, Reading, Severity, Shipment, ShipmentStatus};
pub use monitor::{IngestError, IngestOutcome, Monitor};
pub use query::{QueryError, QueryService};
pub use storage::{MemoryStore, Store, StoreError};
