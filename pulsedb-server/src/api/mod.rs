//! HTTP API endpoints

use axum::{
    extract::{Query as QueryParams, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use pulsedb_core::{Engine, Point, Query, SeriesData, SeriesId, TimeRange, WriteRequest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state
pub type AppState = Arc<Engine>;

/// Create the API router
pub fn create_router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/write", post(write))
        .route("/query", get(query))
        .route("/series", get(series))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PointEntry {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub metric: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub points: Vec<PointEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesBody {
    pub series: Vec<SeriesEntry>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy".to_string(),
    })
}

async fn write(
    State(engine): State<AppState>,
    Json(body): Json<SeriesBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    let request = WriteRequest {
        series: body
            .series
            .into_iter()
            .map(|entry| SeriesData {
                series_id: SeriesId {
                    metric: entry.metric,
                    tags: entry.tags,
                },
                points: entry
                    .points
                    .iter()
                    .map(|p| Point::new(p.timestamp, p.value))
                    .collect(),
            })
            .collect(),
    };

    engine.write(&request).map_err(internal_error)?;

    Ok(Json(StatusResponse {
        status: "success".to_string(),
    }))
}

async fn query(
    State(engine): State<AppState>,
    QueryParams(params): QueryParams<HashMap<String, String>>,
) -> Result<Json<SeriesBody>, ApiError> {
    let query = parse_query_params(params).map_err(bad_request)?;
    let result = engine.read(&query).map_err(internal_error)?;

    Ok(Json(SeriesBody {
        series: result.series.into_iter().map(to_series_entry).collect(),
    }))
}

async fn series(
    State(engine): State<AppState>,
    QueryParams(params): QueryParams<HashMap<String, String>>,
) -> Json<Vec<SeriesId>> {
    let series = match params.get("metric") {
        Some(metric) => engine.find_series(metric, &BTreeMap::new()),
        None => engine.all_series(),
    };
    Json(series)
}

/// Every query parameter other than `metric`/`start`/`end` is a tag filter;
/// a missing bound defaults to the full range
fn parse_query_params(mut params: HashMap<String, String>) -> Result<Query, String> {
    let metric = params
        .remove("metric")
        .ok_or("missing required parameter: metric")?;

    let start = match params.remove("start") {
        Some(s) => s.parse().map_err(|_| "invalid start time".to_string())?,
        None => i64::MIN,
    };
    let end = match params.remove("end") {
        Some(s) => s.parse().map_err(|_| "invalid end time".to_string())?,
        None => i64::MAX,
    };

    Ok(Query {
        metric,
        tags: params.into_iter().collect(),
        time_range: TimeRange::new(start, end),
    })
}

fn to_series_entry(data: SeriesData) -> SeriesEntry {
    SeriesEntry {
        metric: data.series_id.metric,
        tags: data.series_id.tags,
        points: data
            .points
            .iter()
            .map(|p| PointEntry {
                timestamp: p.timestamp,
                value: p.value,
            })
            .collect(),
    }
}
