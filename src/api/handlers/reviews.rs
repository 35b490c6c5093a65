//! Per-review endpoints: listing, stats, votes, moderation, flags, abuse
//! reports and responses.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    FlagRequest, ListQuery, ModerateRequest, ModerationResponse, ReportRequest, ReportResponse,
    RespondRequest, VoteRequest,
};
use crate::app_state::AppState;
use crate::domain::{
    ReviewKind, ReviewPage, ReviewRecord, ReviewStatus, TargetRef, TargetStats, VoteSummary,
};
use crate::error::{ErrorResponse, ReviewError};

/// Header carrying the authenticated caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Reads the caller's user id from [`USER_ID_HEADER`].
fn caller_id(headers: &HeaderMap) -> Result<u64, ReviewError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| ReviewError::Validation("missing or invalid X-User-Id header".to_string()))
}

/// `GET /reviews/{kind}/list` — Page of approved reviews.
///
/// # Errors
///
/// Returns [`ReviewError::Validation`] for bad filters or sort and
/// [`ReviewError::UnknownKind`] for an unknown kind.
#[utoipa::path(
    get,
    path = "/api/v1/reviews/{kind}/list",
    tag = "Reviews",
    summary = "List approved reviews",
    description = "Approved reviews of one kind, optionally for one target and star value. `helpful` ranks by Wilson score and falls back to newest for kinds without helpfulness votes.",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ListQuery,
    ),
    responses(
        (status = 200, description = "One page of reviews", body = ReviewPage),
        (status = 400, description = "Unknown kind, sort or bad filter", body = ErrorResponse),
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    let query = query.into_domain(kind)?;
    let page = state.aggregation.list_reviews(kind, &query).await?;
    Ok(Json(page))
}

/// `GET /reviews/{kind}/stats/{target_type}/{target_id}` — Rating summary.
///
/// # Errors
///
/// Returns [`ReviewError::UnknownKind`] for an unknown kind.
#[utoipa::path(
    get,
    path = "/api/v1/reviews/{kind}/stats/{target_type}/{target_id}",
    tag = "Reviews",
    summary = "Get rating statistics",
    description = "Average, count and 1-5 distribution of the approved reviews of one kind about one target.",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ("target_type" = String, Path, description = "Target entity type"),
        ("target_id" = u64, Path, description = "Target entity id"),
    ),
    responses(
        (status = 200, description = "Rating statistics", body = TargetStats),
        (status = 400, description = "Unknown review kind", body = ErrorResponse),
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    Path((kind, target_type, target_id)): Path<(String, String, u64)>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    let stats = state
        .aggregation
        .get_stats(kind, &TargetRef::new(target_type, target_id))
        .await;
    Ok(Json(stats))
}

/// `POST /reviews/{kind}/{id}/vote` — Cast or toggle a helpfulness vote.
///
/// # Errors
///
/// Returns [`ReviewError::NotFound`] if the review does not exist.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{kind}/{id}/vote",
    tag = "Reviews",
    summary = "Vote on helpfulness",
    description = "Casting the same vote twice retracts it; casting the opposite vote replaces it.",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ("id" = u64, Path, description = "Review id"),
        ("X-User-Id" = u64, Header, description = "Voting user"),
    ),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote counts after the change", body = VoteSummary),
        (status = 400, description = "Unknown kind or missing user", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse),
    )
)]
pub async fn vote(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    let user_id = caller_id(&headers)?;
    let summary = state.helpfulness.vote(kind, id, user_id, req.helpful).await?;
    Ok(Json(summary))
}

/// `POST /reviews/{kind}/{id}/moderate` — Apply a moderation decision.
///
/// # Errors
///
/// Returns [`ReviewError::Validation`] for an unknown status and
/// [`ReviewError::NotFound`] if the review does not exist.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{kind}/{id}/moderate",
    tag = "Moderation",
    summary = "Moderate a review",
    description = "Moves a review to pending, approved, rejected or flagged. Re-applying the current status is a no-op.",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ("id" = u64, Path, description = "Review id"),
    ),
    request_body = ModerateRequest,
    responses(
        (status = 200, description = "Status after the call", body = ModerationResponse),
        (status = 400, description = "Unknown kind or status", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse),
    )
)]
pub async fn moderate(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, u64)>,
    Json(req): Json<ModerateRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    let status = req.status.parse::<ReviewStatus>()?;
    if !state.moderation.moderate_to(kind, id, status).await? {
        return Err(ReviewError::NotFound(format!("review {kind}/{id}")));
    }
    Ok(Json(ModerationResponse { kind, id, status }))
}

/// `POST /reviews/{kind}/{id}/flag` — Flag a review for re-moderation.
///
/// # Errors
///
/// Returns [`ReviewError::NotFound`] if the review does not exist.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{kind}/{id}/flag",
    tag = "Moderation",
    summary = "Flag a review",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ("id" = u64, Path, description = "Review id"),
    ),
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Review flagged", body = ModerationResponse),
        (status = 404, description = "Review not found", body = ErrorResponse),
    )
)]
pub async fn flag(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, u64)>,
    Json(req): Json<FlagRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    if !state.moderation.flag_review(kind, id, &req.reason).await? {
        return Err(ReviewError::NotFound(format!("review {kind}/{id}")));
    }
    Ok(Json(ModerationResponse {
        kind,
        id,
        status: ReviewStatus::Flagged,
    }))
}

/// `POST /reviews/{kind}/{id}/report` — Report a review as abusive.
///
/// # Errors
///
/// Returns [`ReviewError::NotFound`] if the review does not exist and
/// [`ReviewError::Conflict`] if the caller already reported it.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{kind}/{id}/report",
    tag = "Moderation",
    summary = "Report abuse",
    description = "Records the caller's report and flags the review for re-moderation. Each user may report a review once.",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ("id" = u64, Path, description = "Review id"),
        ("X-User-Id" = u64, Header, description = "Reporting user"),
    ),
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Report recorded", body = ReportResponse),
        (status = 400, description = "Unknown kind or reason, or missing user", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse),
        (status = 409, description = "Already reported by this user", body = ErrorResponse),
    )
)]
pub async fn report(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(req): Json<ReportRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    let reporter_id = caller_id(&headers)?;
    let reason = req.reason()?;
    let review = state
        .moderation
        .report_abuse(kind, id, reporter_id, reason, &req.details)
        .await?;
    Ok(Json(ReportResponse {
        kind,
        id,
        status: review.status,
        reason,
    }))
}

/// `POST /reviews/{kind}/{id}/response` — Owner response to a review.
///
/// # Errors
///
/// Returns [`ReviewError::Forbidden`] unless the caller owns the target.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{kind}/{id}/response",
    tag = "Reviews",
    summary = "Respond to a review",
    description = "Stores the target owner's public response. Only the owner of the reviewed entity may respond.",
    params(
        ("kind" = String, Path, description = "Review kind"),
        ("id" = u64, Path, description = "Review id"),
        ("X-User-Id" = u64, Header, description = "Responding user"),
    ),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Updated review", body = ReviewRecord),
        (status = 400, description = "Kind takes no responses or empty text", body = ErrorResponse),
        (status = 403, description = "Caller does not own the target", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse),
    )
)]
pub async fn respond(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let kind = kind.parse::<ReviewKind>()?;
    let responder_id = caller_id(&headers)?;
    let review = state
        .moderation
        .respond(kind, id, responder_id, &req.text)
        .await?;
    Ok(Json(review))
}

/// Per-review routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reviews/{kind}/list", get(list))
        .route(
            "/reviews/{kind}/stats/{target_type}/{target_id}",
            get(get_stats),
        )
        .route("/reviews/{kind}/{id}/vote", post(vote))
        .route("/reviews/{kind}/{id}/moderate", post(moderate))
        .route("/reviews/{kind}/{id}/flag", post(flag))
        .route("/reviews/{kind}/{id}/report", post(report))
        .route("/reviews/{kind}/{id}/response", post(respond))
}
