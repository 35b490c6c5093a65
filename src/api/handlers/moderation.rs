//! Moderation queue endpoints.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CountsQuery, PendingCountsResponse, PendingListResponse, PendingQuery};
use crate::app_state::AppState;
use crate::domain::ReviewKind;
use crate::error::{ErrorResponse, ReviewError};

/// `GET /moderation/pending` — Reviews awaiting moderation.
///
/// # Errors
///
/// Returns [`ReviewError::UnknownKind`] for an unknown kind.
#[utoipa::path(
    get,
    path = "/api/v1/moderation/pending",
    tag = "Moderation",
    summary = "List pending reviews",
    description = "Pending reviews of one kind, oldest first.",
    params(PendingQuery),
    responses(
        (status = 200, description = "Pending reviews", body = PendingListResponse),
        (status = 400, description = "Unknown review kind", body = ErrorResponse),
    )
)]
pub async fn pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = query.kind.parse::<ReviewKind>()?;
    let data = state
        .moderation
        .get_pending_reviews(kind, query.tenant_id, query.clamped_limit())
        .await?;
    Ok(Json(PendingListResponse {
        count: data.len(),
        data,
    }))
}

/// `GET /moderation/counts` — Pending counts per kind.
///
/// # Errors
///
/// Returns [`ReviewError::Persistence`] on store failures.
#[utoipa::path(
    get,
    path = "/api/v1/moderation/counts",
    tag = "Moderation",
    summary = "Count pending reviews",
    description = "Pending review count per kind for the moderation dashboard. Kinds with nothing pending are omitted.",
    params(CountsQuery),
    responses(
        (status = 200, description = "Pending counts", body = PendingCountsResponse),
    )
)]
pub async fn counts(
    State(state): State<AppState>,
    Query(query): Query<CountsQuery>,
) -> Result<impl IntoResponse, ReviewError> {
    let counts = state.moderation.get_pending_counts(query.tenant_id).await?;
    let total = counts.values().sum();
    Ok(Json(PendingCountsResponse {
        counts: counts
            .into_iter()
            .map(|(kind, count)| (kind.as_str().to_string(), count))
            .collect(),
        total,
    }))
}

/// Moderation queue routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/moderation/pending", get(pending))
        .route("/moderation/counts", get(counts))
}
