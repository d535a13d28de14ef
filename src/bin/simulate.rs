//! Sample data generator
//!
//! Registers a handful of shipments, posts six hours of randomized sensor readings
//! (with occasional excursions and dropped values) to a running server and prints
//! each shipment's risk summary.
//!
//! Usage: simulate [shipments] [readings_per_sensor] [seed]

use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;

const ORIGINS: &[&str] = &["Mumbai", "Delhi", "Kolkata", "Bengaluru"];
const DESTINATIONS: &[&str] = &["Chennai", "Hyderabad", "Pune", "Ahmedabad"];
const SENSORS: &[(&str, &str)] = &[
    ("core_temperature", "C"),
    ("surface_temperature", "C"),
    ("humidity", "%"),
    ("shock", "g"),
    ("route_deviation", "km"),
    ("battery_voltage", "V"),
];

fn sample_value(rng: &mut StdRng, sensor_type: &str) -> Option<f64> {
    // Sensor dropouts
    if rng.gen_bool(0.03) {
        return None;
    }

    let value: f64 = match sensor_type {
        "core_temperature" => {
            let v: f64 = rng.gen_range(3.5..6.5);
            if rng.gen_bool(0.1) {
                v + if rng.gen_bool(0.5) { 3.0 } else { -3.0 }
            } else {
                v
            }
        }
        "surface_temperature" => rng.gen_range(2.0..8.0),
        "humidity" => rng.gen_range(37.0..53.0),
        "shock" => {
            if rng.gen_bool(0.05) {
                rng.gen_range(2.0..5.0)
            } else {
                rng.gen_range(0.0..0.4)
            }
        }
        "route_deviation" => rng.gen_range(0.0..3.0),
        "battery_voltage" => {
            if rng.gen_bool(0.05) {
                rng.gen_range(2.8..3.1)
            } else {
                rng.gen_range(3.4..4.1)
            }
        }
        _ => return None,
    };
    Some((value * 100.0).round() / 100.0)
}

fn generate_readings(rng: &mut StdRng, shipment_id: &str, per_sensor: usize) -> Vec<Value> {
    let base = Utc::now() - ChronoDuration::hours(6);
    let mut readings = Vec::with_capacity(per_sensor * SENSORS.len());

    for (sensor_type, unit) in SENSORS {
        for i in 0..per_sensor {
            let ts = base + ChronoDuration::minutes(5 * i as i64);
            readings.push(json!({
                "reading_id": format!("{}:{}:{}", shipment_id, sensor_type, i),
                "shipment_id": shipment_id,
                "sensor_type": sensor_type,
                "value": sample_value(rng, sensor_type),
                "unit": unit,
                "timestamp": ts.to_rfc3339(),
            }));
        }
    }
    readings
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let shipments: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(5);
    let per_sensor: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(12);
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(42);
    let host = std::env::var("MEDISAFE_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("MEDISAFE_PORT").unwrap_or_else(|_| "8080".to_string());
    let base_url = format!("http://{}:{}", host, port);

    println!("MediSafe Simulation");
    println!("===================");
    println!("Target:              {}", base_url);
    println!("Shipments:           {}", shipments);
    println!("Readings per sensor: {}", per_sensor);
    println!("Seed:                {}", seed);
    println!();

    let client = Client::new();
    let mut rng = StdRng::seed_from_u64(seed);

    for n in 0..shipments {
        let shipment_id = format!("SHP-{}", 100 + n);
        let origin = ORIGINS[rng.gen_range(0..ORIGINS.len())];
        let destination = DESTINATIONS[rng.gen_range(0..DESTINATIONS.len())];

        let response = client
            .post(format!("{}/shipments", base_url))
            .json(&json!({"id": shipment_id, "origin": origin, "destination": destination}))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            println!("{} already registered, adding readings", shipment_id);
        } else if !response.status().is_success() {
            eprintln!("Error: {}", response.text().await?);
            return Ok(());
        }

        let readings = generate_readings(&mut rng, &shipment_id, per_sensor);
        let start = Instant::now();
        let result: Value = client
            .post(format!("{}/readings", base_url))
            .json(&readings)
            .send()
            .await?
            .json()
            .await?;

        println!("Shipment {} ({} -> {})", shipment_id, origin, destination);
        println!(
            "  Ingested: {} accepted, {} rejected, {} failed in {:?}",
            result["accepted"],
            result["rejected"],
            result["failed"],
            start.elapsed()
        );

        let summary: Value = client
            .get(format!("{}/shipments/{}/summary", base_url, shipment_id))
            .send()
            .await?
            .json()
            .await?;

        if let Some(sensors) = summary["sensors"].as_array() {
            for s in sensors {
                println!(
                    "  {}: Avg={} Min={} Max={}, Violations={} -> {} risk",
                    s["sensor_type"].as_str().unwrap_or("?"),
                    s["average"],
                    s["min"],
                    s["max"],
                    s["warnings"].as_u64().unwrap_or(0) + s["criticals"].as_u64().unwrap_or(0),
                    s["risk"].as_str().unwrap_or("?"),
                );
            }
        }
        println!(
            "  Overall risk: {} ({}), status {}",
            summary["risk_score"],
            summary["risk_category"].as_str().unwrap_or("?"),
            summary["status"].as_str().unwrap_or("?"),
        );
        if let Some(critical) = summary["critical_sensors"].as_array() {
            if !critical.is_empty() {
                println!("  Critical sensors: {:?}", critical);
            }
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_values_are_rounded_and_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            if let Some(v) = sample_value(&mut rng, "battery_voltage") {
                assert!((2.8..=4.1).contains(&v));
                assert_eq!((v * 100.0).round() / 100.0, v);
            }
        }
        assert_eq!(sample_value(&mut rng, "radiation"), None);
    }

    #[test]
    fn test_generated_readings_cover_every_sensor() {
        let mut rng = StdRng::seed_from_u64(7);
        let readings = generate_readings(&mut rng, "SHP-100", 12);
        assert_eq!(readings.len(), 12 * SENSORS.len());
        assert_eq!(readings[0]["reading_id"], "SHP-100:core_temperature:0");
        assert_eq!(readings[12]["sensor_type"], "surface_temperature");
    }
}
