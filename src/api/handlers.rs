use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{AppId, CounterInput, CounterValue};
use crate::store::{CounterQuery, CounterStore, ErrorEvent};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<CounterStore>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub schema_ready: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.store.backend_name(),
        schema_ready: state.store.is_bootstrapped(),
    })
}

// ============================================================================
// Store
// ============================================================================

#[derive(Deserialize)]
pub struct StoreRequest {
    pub counters: Vec<CounterInput>,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub app_id: Option<AppId>,
}

#[derive(Serialize)]
pub struct StoreResponse {
    pub accepted: usize,
}

/// Storage failures do not reach the response; they land on the error
/// channel, see `GET /errors`.
pub async fn store_counters(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StoreRequest>,
) -> Result<(StatusCode, Json<StoreResponse>), ApiError> {
    if request.counters.is_empty() {
        return Err(ApiError::BadRequest("no counters in request".into()));
    }
    if let Some(blank) = request.counters.iter().position(|c| c.name.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "counter {} has an empty name",
            blank
        )));
    }

    state
        .store
        .store_counters(&request.counters, request.timestamp, request.app_id)
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(StoreResponse {
            accepted: request.counters.len(),
        }),
    ))
}

// ============================================================================
// Query
// ============================================================================

#[derive(Deserialize)]
pub struct ValuesParams {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub skip: usize,
    pub app_id: Option<String>,
}

#[derive(Serialize)]
pub struct ValuesResponse {
    pub counter: String,
    pub date: Option<NaiveDate>,
    pub skip: usize,
    pub values: Vec<CounterValue>,
}

pub async fn counter_values(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<ValuesParams>,
) -> Json<ValuesResponse> {
    let mut query = CounterQuery::new(&name).with_skip(params.skip);
    if let Some(date) = params.date {
        query = query.with_date(date);
    }
    if let Some(label) = params.app_id.as_deref() {
        query = query.with_app_id(AppId::from_label(label));
    }

    let values = state.store.query_counter_values(&query).await;

    Json(ValuesResponse {
        counter: name,
        date: params.date,
        skip: params.skip,
        values,
    })
}

// ============================================================================
// Counter Names
// ============================================================================

#[derive(Serialize)]
pub struct CountersResponse {
    pub counters: Vec<String>,
}

pub async fn list_counters(State(state): State<Arc<AppState>>) -> Json<CountersResponse> {
    let mut counters = state.store.counter_names().await;
    counters.sort();
    Json(CountersResponse { counters })
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
pub struct ErrorsResponse {
    pub total: u64,
    pub errors: Vec<ErrorEvent>,
}

pub async fn recent_errors(State(state): State<Arc<AppState>>) -> Json<ErrorsResponse> {
    let errors = state.store.errors();
    Json(ErrorsResponse {
        total: errors.total(),
        errors: errors.recent(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
