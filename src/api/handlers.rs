use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{Alert, RawReading, SensorType, Shipment, ShipmentId, StoredReading, TimeRange};
use crate::monitor::{IngestError, IngestOutcome, Monitor};
use crate::query::{CurrentStatus, QueryError, QueryService, ShipmentSummary};
use crate::storage::StoreError;
use crate::thresholds::{RegistryError, SensorThreshold};

/// Application state shared across handlers
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub query: QueryService,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        let query = QueryService::new(monitor.store(), monitor.registry());
        Self { monitor, query }
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Shipments
// ============================================================================

#[derive(Deserialize)]
pub struct CreateShipmentRequest {
    pub id: ShipmentId,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub scheduled_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_departure: Option<DateTime<Utc>>,
}

pub async fn create_shipment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateShipmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.id.as_str().is_empty() {
        return Err(ApiError::BadRequest("shipment id must not be empty".to_string()));
    }

    let mut shipment = Shipment::new(request.id, request.origin, request.destination);
    shipment.scheduled_departure = request.scheduled_departure;
    shipment.scheduled_arrival = request.scheduled_arrival;
    shipment.actual_departure = request.actual_departure;

    let shipment = state.monitor.register_shipment(shipment).await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

pub async fn list_shipments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Shipment>>, ApiError> {
    Ok(Json(state.query.list_shipments()?))
}

#[derive(Deserialize)]
pub struct DeliveredParams {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

pub async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DeliveredParams>,
) -> Result<Json<Shipment>, ApiError> {
    let shipment = state
        .monitor
        .mark_delivered(&ShipmentId::new(id), params.at)
        .await?;
    Ok(Json(shipment))
}

pub async fn archive_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shipment>, ApiError> {
    Ok(Json(state.monitor.archive_shipment(&ShipmentId::new(id)).await?))
}

pub async fn restore_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shipment>, ApiError> {
    Ok(Json(state.monitor.restore_in_transit(&ShipmentId::new(id)).await?))
}

// ============================================================================
// Thresholds
// ============================================================================

pub async fn put_threshold(
    State(state): State<Arc<AppState>>,
    Json(threshold): Json<SensorThreshold>,
) -> Result<Json<SensorThreshold>, ApiError> {
    state.monitor.set_threshold(threshold.clone()).await?;
    Ok(Json(threshold))
}

// ============================================================================
// Readings
// ============================================================================

/// A single reading or a batch
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ReadingsPayload {
    Batch(Vec<RawReading>),
    Single(RawReading),
}

#[derive(Serialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IngestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
}

pub async fn post_readings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReadingsPayload>,
) -> Result<axum::response::Response, ApiError> {
    match payload {
        ReadingsPayload::Single(raw) => {
            let outcome = state.monitor.ingest(raw).await?;
            Ok(Json(outcome).into_response())
        }
        ReadingsPayload::Batch(raws) => {
            let results = state.monitor.ingest_batch(raws).await;

            let mut response = BatchResponse {
                accepted: 0,
                rejected: 0,
                failed: 0,
                results: Vec::with_capacity(results.len()),
            };
            for (index, result) in results.into_iter().enumerate() {
                let item = match result {
                    Ok(outcome) => {
                        response.accepted += 1;
                        BatchItem {
                            index,
                            outcome: Some(outcome),
                            error: None,
                        }
                    }
                    Err(e) => {
                        match e {
                            IngestError::Validation(_) => response.rejected += 1,
                            IngestError::Persistence(_) => response.failed += 1,
                        }
                        BatchItem {
                            index,
                            outcome: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                response.results.push(item);
            }

            Ok(Json(response).into_response())
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Optional half-open `[from, to)` window
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl RangeParams {
    fn range(&self) -> Result<TimeRange, ApiError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ApiError::BadRequest(format!(
                    "'from' ({}) is after 'to' ({})",
                    from, to
                )));
            }
        }
        Ok(TimeRange::new(self.from, self.to))
    }
}

pub async fn shipment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CurrentStatus>, ApiError> {
    Ok(Json(state.query.current_status(&ShipmentId::new(id))?))
}

pub async fn alert_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let range = params.range()?;
    Ok(Json(state.query.alert_history(&ShipmentId::new(id), range)?))
}

pub async fn reading_series(
    State(state): State<Arc<AppState>>,
    Path((id, sensor_type)): Path<(String, String)>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<StoredReading>>, ApiError> {
    let range = params.range()?;
    let series = state.query.reading_series(
        &ShipmentId::new(id),
        &SensorType::new(sensor_type),
        range,
    )?;
    Ok(Json(series))
}

pub async fn shipment_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShipmentSummary>, ApiError> {
    Ok(Json(state.query.shipment_summary(&ShipmentId::new(id))?))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Conflict(_) => ApiError::Conflict(err.to_string()),
            StoreError::Transient(_) => ApiError::Unavailable(err.to_string()),
            StoreError::Serialization(_) | StoreError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(reason) => ApiError::BadRequest(reason.to_string()),
            IngestError::Persistence(e) => e.into(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::ShipmentNotFound(_) => ApiError::NotFound(err.to_string()),
            QueryError::UnknownSensorType(_) => ApiError::BadRequest(err.to_string()),
            QueryError::Store(e) => e.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RegistryError::UnknownSensorType(_) | RegistryError::InvalidRange { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            RegistryError::Store(e) => e.into(),
        }
    }
}
