//! System endpoints: health check and review kind catalog.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::{ReviewKind, TargetSpec};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Supported review kind info.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewKindInfo {
    kind: &'static str,
    table: &'static str,
    /// Fixed target type, or `null` when stored per review.
    target_type: Option<&'static str>,
    accepts_responses: bool,
    tracks_helpfulness: bool,
}

/// `GET /config/review-kinds` — List supported review kinds.
#[utoipa::path(
    get,
    path = "/config/review-kinds",
    tag = "System",
    summary = "List supported review kinds",
    description = "Returns metadata for every review kind the engine aggregates and moderates.",
    responses(
        (status = 200, description = "Review kind catalog", body = Vec<ReviewKindInfo>),
    )
)]
pub async fn review_kinds_handler() -> impl IntoResponse {
    let kinds: Vec<ReviewKindInfo> = ReviewKind::ALL
        .iter()
        .map(|kind| {
            let schema = kind.schema();
            ReviewKindInfo {
                kind: kind.as_str(),
                table: schema.table,
                target_type: match schema.target {
                    TargetSpec::Fixed(target_type) => Some(target_type),
                    TargetSpec::Polymorphic { .. } => None,
                },
                accepts_responses: schema.response_field.is_some(),
                tracks_helpfulness: schema.tracks_helpfulness,
            }
        })
        .collect();
    (StatusCode::OK, Json(kinds))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/review-kinds", get(review_kinds_handler))
}
