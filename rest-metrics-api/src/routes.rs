use axum::{
    Router,
    body::Bytes,
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use log::warn;
use rest_metrics::{CheckData, VersionKey, VersionRegistry, VersionResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

pub type SharedRegistry = Arc<VersionRegistry>;

pub fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/api/v1/data", post(post_data))
        .route("/api/v1/rest-api-metrics", get(get_metrics))
        .route(
            "/api/v1/rest-api-metrics/tracked-endpoints",
            get(get_tracked_endpoints),
        )
        .route("/api/v1/rest-api-metrics/versions", get(get_versions))
        .with_state(registry)
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    accepted: usize,
    rejected: usize,
}

async fn post_data(
    State(registry): State<SharedRegistry>,
    body: Bytes,
) -> Result<Json<IngestResponse>, StatusCode> {
    let records: Vec<Value> = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejecting check data batch: {}", e);

            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let mut response = IngestResponse {
        accepted: 0,
        rejected: 0,
    };
    for record in records {
        let stored = serde_json::from_value::<CheckData>(record)
            .map_err(anyhow::Error::from)
            .and_then(|check| registry.ingest(&check));
        match stored {
            Ok(_) => response.accepted += 1,
            Err(e) => {
                warn!("Skipping check record: {:#}", e);
                response.rejected += 1;
            }
        }
    }

    Ok(Json(response))
}

#[derive(Deserialize)]
struct VersionQuery {
    application_id: String,
    application_version: String,
}

#[derive(Deserialize)]
struct MetricsQuery {
    application_id: String,
    application_version: String,
    max_ts: Option<i64>,
}

async fn get_metrics(
    Query(q): Query<MetricsQuery>,
    State(registry): State<SharedRegistry>,
) -> Result<Json<VersionResult>, StatusCode> {
    let cache = registry
        .get(&q.application_id, &q.application_version)
        .ok_or(StatusCode::NOT_FOUND)?;
    let max_ts = q.max_ts.unwrap_or_else(|| Utc::now().timestamp_millis());

    Ok(Json(cache.get_data(max_ts)))
}

async fn get_tracked_endpoints(
    Query(q): Query<VersionQuery>,
    State(registry): State<SharedRegistry>,
) -> Result<Json<BTreeSet<String>>, StatusCode> {
    let cache = registry
        .get(&q.application_id, &q.application_version)
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(cache.list_tracked_endpoints()))
}

async fn get_versions(State(registry): State<SharedRegistry>) -> Json<Vec<VersionKey>> {
    Json(registry.versions())
}
