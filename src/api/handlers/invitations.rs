//! Invitation scheduling endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{ScheduleInvitationRequest, ScheduleInvitationResponse};
use crate::app_state::AppState;
use crate::error::ReviewError;

/// `POST /invitations` — Schedule a review invitation.
///
/// An unknown vertical is not an error; the response reports
/// `scheduled: false`.
///
/// # Errors
///
/// Returns [`ReviewError::Persistence`] if the task cannot be queued.
#[utoipa::path(
    post,
    path = "/api/v1/invitations",
    tag = "Invitations",
    summary = "Schedule a review invitation",
    description = "Queues an email inviting the user to review a completed transaction once the delay has passed.",
    request_body = ScheduleInvitationRequest,
    responses(
        (status = 202, description = "Invitation queued", body = ScheduleInvitationResponse),
        (status = 200, description = "Unknown vertical, nothing queued", body = ScheduleInvitationResponse),
    )
)]
pub async fn schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleInvitationRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let scheduled = state
        .invitations
        .schedule_invitation(&req.vertical, req.transaction_id, req.user_id, req.delay_hours)
        .await?;
    let status = if scheduled {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ScheduleInvitationResponse { scheduled })))
}

/// Invitation routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/invitations", post(schedule))
}
