use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    alert_history, archive_shipment, create_shipment, health_check, list_shipments,
    mark_delivered, post_readings, put_threshold, reading_series, restore_shipment,
    shipment_status, shipment_summary, AppState,
};
use crate::alerts::Notifier;
use crate::config::MonitorConfig;
use crate::monitor::Monitor;
use crate::storage::{load_snapshot, persist_snapshot, MemoryStore, SnapshotWorker, Store};
use crate::thresholds::ThresholdRegistry;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Shipments
        .route("/shipments", get(list_shipments).post(create_shipment))
        .route("/shipments/:id/delivered", post(mark_delivered))
        .route("/shipments/:id/archive", post(archive_shipment))
        .route("/shipments/:id/restore", post(restore_shipment))
        // Thresholds
        .route("/thresholds", put(put_threshold))
        // Readings
        .route("/readings", post(post_readings))
        // Queries
        .route("/shipments/:id/status", get(shipment_status))
        .route("/shipments/:id/alerts", get(alert_history))
        .route("/shipments/:id/readings/:sensor_type", get(reading_series))
        .route("/shipments/:id/summary", get(shipment_summary))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Restore state
    let store = Arc::new(match &config.snapshot_path {
        Some(path) => load_snapshot(path)?,
        None => {
            tracing::warn!("No snapshot path configured, state will not survive restarts");
            MemoryStore::new()
        }
    });
    let dyn_store: Arc<dyn Store> = store.clone();

    let thresholds = config.thresholds()?;
    let registry = Arc::new(ThresholdRegistry::from_config(
        Arc::clone(&dyn_store),
        &thresholds,
    )?);

    let monitor = Arc::new(Monitor::new(
        dyn_store,
        registry,
        Notifier::new(config.notify_targets.clone()),
        config.retry,
    ));
    let state = Arc::new(AppState::new(monitor));

    // Start background workers
    let snapshot_worker = config.snapshot_path.as_ref().map(|path| {
        Arc::new(SnapshotWorker::new(
            Arc::clone(&store),
            path.clone(),
            config.snapshot_interval,
        ))
    });
    let snapshot_handle = snapshot_worker.as_ref().map(|w| Arc::clone(w).start());

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting MediSafe server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(snapshot_worker.clone()))
        .await?;

    if let Some(handle) = snapshot_handle {
        handle.abort();
    }

    // Final snapshot after in-flight requests have drained
    if let Some(path) = &config.snapshot_path {
        let bytes = persist_snapshot(Arc::clone(&store), path.clone()).await?;
        tracing::info!(path = %path.display(), bytes, "Final snapshot written");
    }

    tracing::info!("MediSafe server stopped");
    Ok(())
}

async fn shutdown_signal(snapshot_worker: Option<Arc<SnapshotWorker>>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    if let Some(worker) = snapshot_worker {
        worker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RetryPolicy;
    use crate::thresholds::ThresholdConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let registry = Arc::new(
            ThresholdRegistry::from_config(Arc::clone(&store), &ThresholdConfig::builtin())
                .unwrap(),
        );
        let monitor = Arc::new(Monitor::new(
            store,
            registry,
            Notifier::log_only(),
            RetryPolicy::immediate(1),
        ));
        build_router(Arc::new(AppState::new(monitor)))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_shipment(app: &Router, id: &str) {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/shipments",
                serde_json::json!({"id": id, "origin": "Mumbai", "destination": "Chennai"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    fn reading(id: &str, value: f64, ts: &str) -> serde_json::Value {
        serde_json::json!({
            "reading_id": id,
            "shipment_id": "SHP-101",
            "sensor_type": "core_temperature",
            "value": value,
            "unit": "°C",
            "timestamp": ts
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_duplicate_shipment_conflict() {
        let app = create_test_app();
        create_shipment(&app, "SHP-101").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/shipments",
                serde_json::json!({"id": "SHP-101", "origin": "A", "destination": "B"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ingest_and_query() {
        let app = create_test_app();
        create_shipment(&app, "SHP-101").await;

        // Single reading
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/readings",
                reading("r1", 5.0, "2024-01-01T10:00:00Z"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "processed");

        // Batch
        let batch = serde_json::json!([
            reading("r2", 9.0, "2024-01-01T10:05:00Z"),
            reading("r3", 11.0, "2024-01-01T10:10:00Z"),
            reading("r4", 4.0, "2024-01-01T10:15:00Z"),
        ]);
        let response = app
            .clone()
            .oneshot(json_request("POST", "/readings", batch))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["accepted"], 3);
        assert_eq!(body["results"][2]["outcome"]["transition"]["kind"], "closed");

        let response = app
            .clone()
            .oneshot(get_request("/shipments/SHP-101/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["shipment"]["status"], "compromised");

        let response = app
            .clone()
            .oneshot(get_request(
                "/shipments/SHP-101/alerts?from=2024-01-01T10:00:00Z&to=2024-01-01T11:00:00Z",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["severity"], "critical");

        let response = app
            .clone()
            .oneshot(get_request("/shipments/SHP-101/readings/core_temperature"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 4);

        let response = app
            .oneshot(get_request("/shipments/SHP-101/summary"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["risk_category"], "medium");
    }

    #[tokio::test]
    async fn test_rejected_reading_is_bad_request() {
        let app = create_test_app();

        let response = app
            .oneshot(json_request(
                "POST",
                "/readings",
                reading("r1", 5.0, "2024-01-01T10:00:00Z"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Unknown shipment"));
    }

    #[tokio::test]
    async fn test_threshold_update() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/thresholds",
                serde_json::json!({
                    "scope": {"shipment": "SHP-104"},
                    "sensor_type": "core_temperature",
                    "min": 2.0,
                    "max": 6.0,
                    "unit": "C"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/thresholds",
                serde_json::json!({
                    "scope": "default",
                    "sensor_type": "humidity",
                    "min": 60.0,
                    "max": 30.0,
                    "unit": "%"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_shipment_not_found() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(get_request("/shipments/nonexistent/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request(
                "POST",
                "/shipments/nonexistent/delivered",
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_inverted_range_is_bad_request() {
        let app = create_test_app();
        create_shipment(&app, "SHP-101").await;

        let response = app
            .oneshot(get_request(
                "/shipments/SHP-101/alerts?from=2024-01-02T00:00:00Z&to=2024-01-01T00:00:00Z",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
