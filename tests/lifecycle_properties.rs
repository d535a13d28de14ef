//! Property-based tests for the alert lifecycle, driven through the public ingest API

use chrono::{DateTime, Duration, TimeZone, Utc};
use medisafe::alerts::{Notifier, Transition};
use medisafe::data::{Alert, SensorKey, Severity, ShipmentStatus, TimeRange};
use medisafe::storage::{MemoryStore, RetryPolicy, Store};
use medisafe::thresholds::{ThresholdConfig, ThresholdRegistry};
use medisafe::{IngestError, IngestOutcome, Monitor, RawReading, Shipment};
use proptest::prelude::*;
use std::sync::Arc;

const SHIPMENT: &str = "SHP-101";
const SENSOR: &str = "core_temperature";

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

fn raw(index: usize, value: f64) -> RawReading {
    raw_for(SENSOR, "C", index, value)
}

fn raw_for(sensor: &str, unit: &str, index: usize, value: f64) -> RawReading {
    RawReading {
        reading_id: Some(format!("r{}", index)),
        shipment_id: SHIPMENT.to_string(),
        sensor_type: sensor.to_string(),
        value: Some(value),
        unit: unit.to_string(),
        timestamp: Some((base() + Duration::minutes(5 * index as i64)).to_rfc3339()),
        location: None,
    }
}

fn setup() -> (Arc<dyn Store>, Monitor) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = Arc::new(
        ThresholdRegistry::from_config(Arc::clone(&store), &ThresholdConfig::builtin()).unwrap(),
    );
    let monitor = Monitor::new(
        Arc::clone(&store),
        registry,
        Notifier::log_only(),
        RetryPolicy::immediate(1),
    );
    tokio_test::block_on(monitor.register_shipment(Shipment::new(SHIPMENT, "Mumbai", "Chennai")))
        .unwrap();
    (store, monitor)
}

fn severity_in(value: f64, min: f64, max: f64, band: f64) -> Option<Severity> {
    let margin = if value > max {
        value - max
    } else if value < min {
        min - value
    } else {
        return None;
    };
    if margin <= band {
        Some(Severity::Warning)
    } else {
        Some(Severity::Critical)
    }
}

/// Built-in core temperature profile: 2..8 C with a 1 C warning band
fn expected_severity(value: f64) -> Option<Severity> {
    severity_in(value, 2.0, 8.0, 1.0)
}

/// Built-in humidity profile: 30..60 % with a 5 % warning band
fn expected_humidity_severity(value: f64) -> Option<Severity> {
    severity_in(value, 30.0, 60.0, 5.0)
}

/// Maximal runs of violating readings: (first index, last index, peak severity, closed)
fn expected_runs(values: &[f64]) -> Vec<(usize, usize, Severity, bool)> {
    expected_runs_by(values, expected_severity)
}

fn expected_runs_by(
    values: &[f64],
    severity: fn(f64) -> Option<Severity>,
) -> Vec<(usize, usize, Severity, bool)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize, Severity)> = None;

    for (i, value) in values.iter().enumerate() {
        match (severity(*value), current.as_mut()) {
            (Some(sev), Some(run)) => {
                run.1 = i;
                run.2 = run.2.max(sev);
            }
            (Some(sev), None) => current = Some((i, i, sev)),
            (None, Some(_)) => {
                if let Some((start, end, sev)) = current.take() {
                    runs.push((start, end, sev, true));
                }
            }
            (None, None) => {}
        }
    }
    if let Some((start, end, sev)) = current {
        runs.push((start, end, sev, false));
    }
    runs
}

fn alerts(store: &Arc<dyn Store>) -> Vec<Alert> {
    store.load_alerts(&SHIPMENT.into(), TimeRange::all()).unwrap()
}

fn value_strategy() -> impl Strategy<Value = f64> {
    // Whole and half degrees across compliant, warning and critical on both sides
    (-4i32..=28).prop_map(|half_degrees| half_degrees as f64 / 2.0)
}

fn humidity_strategy() -> impl Strategy<Value = f64> {
    (20i32..=70).prop_map(f64::from)
}

/// Open alerts per sensor type on the shipment
fn open_per_key(store: &Arc<dyn Store>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for alert in alerts(store).into_iter().filter(|a| a.is_open()) {
        let sensor = alert.sensor_type.as_str().to_string();
        match counts.iter_mut().find(|(s, _)| *s == sensor) {
            Some((_, n)) => *n += 1,
            None => counts.push((sensor, 1)),
        }
    }
    counts
}

/// Ingest one key's readings in order; returns the most open alerts any key had
/// after a single ingest
async fn feed(
    monitor: Arc<Monitor>,
    store: Arc<dyn Store>,
    sensor: &'static str,
    unit: &'static str,
    values: Vec<f64>,
) -> usize {
    let mut worst = 0;
    for (i, value) in values.into_iter().enumerate() {
        let outcome = monitor.ingest(raw_for(sensor, unit, i, value)).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed { .. }));
        let most = open_per_key(&store).into_iter().map(|(_, n)| n).max().unwrap_or(0);
        worst = worst.max(most);
    }
    worst
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn alerts_follow_violation_runs(values in prop::collection::vec(value_strategy(), 1..40)) {
        let (store, monitor) = setup();

        let key = SensorKey::new(SHIPMENT.into(), SENSOR.into());
        for (i, value) in values.iter().enumerate() {
            let outcome = tokio_test::block_on(monitor.ingest(raw(i, *value))).unwrap();
            let is_processed = matches!(outcome, IngestOutcome::Processed { .. });
            prop_assert!(is_processed);

            // At most one open alert per key after every reading
            let open = alerts(&store).iter().filter(|a| a.is_open()).count();
            prop_assert!(open <= 1);
            prop_assert_eq!(
                store.find_open_alert(&key).unwrap().is_some(),
                expected_severity(*value).is_some()
            );
        }

        let stored = alerts(&store);
        let runs = expected_runs(&values);
        prop_assert_eq!(stored.len(), runs.len());

        for (alert, (start, end, peak, closed)) in stored.iter().zip(runs.iter()) {
            prop_assert_eq!(alert.opened_at, base() + Duration::minutes(5 * *start as i64));
            prop_assert_eq!(alert.severity, *peak);
            prop_assert_eq!(alert.triggering_readings.len(), end - start + 1);
            prop_assert_eq!(alert.is_open(), !*closed);
            if *closed {
                // Closed by the first compliant reading after the run
                prop_assert_eq!(
                    alert.closed_at,
                    Some(base() + Duration::minutes(5 * (*end as i64 + 1)))
                );
            }
        }

        let open = stored.iter().filter(|a| a.is_open()).count();
        prop_assert!(open <= 1);
        prop_assert_eq!(store.find_open_alert(&key).unwrap().is_some(), open == 1);

        let compromised = runs
            .iter()
            .any(|(_, _, sev, closed)| *closed && *sev == Severity::Critical);
        let shipment = store.load_shipment(&SHIPMENT.into()).unwrap().unwrap();
        prop_assert_eq!(shipment.status == ShipmentStatus::Compromised, compromised);
    }

    #[test]
    fn severity_never_decreases_while_open(values in prop::collection::vec(value_strategy(), 1..30)) {
        let (_store, monitor) = setup();
        let mut peak: Option<Severity> = None;

        for (i, value) in values.iter().enumerate() {
            let outcome = tokio_test::block_on(monitor.ingest(raw(i, *value))).unwrap();
            let transition = match outcome {
                IngestOutcome::Processed { transition, .. } => transition,
                other => panic!("unexpected outcome {:?}", other),
            };
            match transition {
                Transition::Opened { alert } => peak = Some(alert.severity),
                Transition::Extended { alert } | Transition::Escalated { alert, .. } => {
                    prop_assert!(Some(alert.severity) >= peak);
                    peak = Some(alert.severity);
                }
                Transition::Closed { alert, .. } => {
                    prop_assert_eq!(Some(alert.severity), peak);
                    peak = None;
                }
                Transition::None => prop_assert!(peak.is_none()),
            }
        }
    }

    #[test]
    fn concurrent_keys_keep_their_own_lifecycle(
        temps in prop::collection::vec(value_strategy(), 1..20),
        humidity in prop::collection::vec(humidity_strategy(), 1..20),
    ) {
        let (store, monitor) = setup();
        let monitor = Arc::new(monitor);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let (worst_temp, worst_humidity) = runtime.block_on(async {
            let t = tokio::spawn(feed(
                Arc::clone(&monitor),
                Arc::clone(&store),
                SENSOR,
                "C",
                temps.clone(),
            ));
            let h = tokio::spawn(feed(
                Arc::clone(&monitor),
                Arc::clone(&store),
                "humidity",
                "%",
                humidity.clone(),
            ));
            (t.await.unwrap(), h.await.unwrap())
        });
        prop_assert!(worst_temp <= 1);
        prop_assert!(worst_humidity <= 1);

        let stored = alerts(&store);
        let temp_runs = expected_runs_by(&temps, expected_severity);
        let humidity_runs = expected_runs_by(&humidity, expected_humidity_severity);
        let count = |sensor: &str| stored.iter().filter(|a| a.sensor_type.as_str() == sensor).count();
        prop_assert_eq!(count(SENSOR), temp_runs.len());
        prop_assert_eq!(count("humidity"), humidity_runs.len());

        // Whatever the interleaving, once no Critical alert is open the last Critical
        // closure saw none open either
        let closed_critical = stored
            .iter()
            .any(|a| !a.is_open() && a.severity == Severity::Critical);
        let open_critical = stored
            .iter()
            .any(|a| a.is_open() && a.severity == Severity::Critical);
        let status = store.load_shipment(&SHIPMENT.into()).unwrap().unwrap().status;
        if !closed_critical {
            prop_assert_eq!(status, ShipmentStatus::InTransit);
        } else if !open_critical {
            prop_assert_eq!(status, ShipmentStatus::Compromised);
        }
    }

    #[test]
    fn redelivery_changes_nothing(values in prop::collection::vec(value_strategy(), 1..25)) {
        let (store, monitor) = setup();

        for (i, value) in values.iter().enumerate() {
            tokio_test::block_on(monitor.ingest(raw(i, *value))).unwrap();
        }
        let before = alerts(&store);
        let status_before = store.load_shipment(&SHIPMENT.into()).unwrap().unwrap().status;

        for (i, value) in values.iter().enumerate() {
            let outcome = tokio_test::block_on(monitor.ingest(raw(i, *value))).unwrap();
            let is_duplicate = matches!(outcome, IngestOutcome::Duplicate { .. });
            prop_assert!(is_duplicate);
        }

        prop_assert_eq!(alerts(&store), before);
        let status_after = store.load_shipment(&SHIPMENT.into()).unwrap().unwrap().status;
        prop_assert_eq!(status_after, status_before);
    }
}

#[test]
fn temperature_excursion_compromises_shipment() {
    let (store, monitor) = setup();

    let outcomes: Vec<IngestOutcome> = [5.0, 9.0, 11.0, 4.0]
        .iter()
        .enumerate()
        .map(|(i, v)| tokio_test::block_on(monitor.ingest(raw(i, *v))).unwrap())
        .collect();

    let names: Vec<&str> = outcomes
        .iter()
        .map(|o| match o {
            IngestOutcome::Processed { transition, .. } => transition.name(),
            _ => "other",
        })
        .collect();
    assert_eq!(names, vec!["none", "opened", "escalated", "closed"]);

    let stored = alerts(&store);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].severity, Severity::Critical);
    assert_eq!(stored[0].peak_value, 11.0);
    assert!(!stored[0].is_open());

    let shipment = store.load_shipment(&SHIPMENT.into()).unwrap().unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Compromised);
}

#[test]
fn reopen_after_close_creates_new_alert() {
    let (store, monitor) = setup();

    for (i, v) in [9.0, 5.0, 8.5].iter().enumerate() {
        tokio_test::block_on(monitor.ingest(raw(i, *v))).unwrap();
    }

    let stored = alerts(&store);
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0].id, stored[1].id);
    assert!(!stored[0].is_open());
    assert!(stored[1].is_open());

    // Warning-only history leaves the shipment in transit
    let shipment = store.load_shipment(&SHIPMENT.into()).unwrap().unwrap();
    assert_eq!(shipment.status, ShipmentStatus::InTransit);
}

#[test]
fn unknown_shipment_is_rejected() {
    let (store, monitor) = setup();
    let mut reading = raw(0, 11.0);
    reading.shipment_id = "SHP-404".to_string();

    let result = tokio_test::block_on(monitor.ingest(reading));
    assert!(matches!(result, Err(IngestError::Validation(_))));
    assert!(alerts(&store).is_empty());
}
