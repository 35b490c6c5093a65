//! Webhook registration endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};

use crate::api::dto::{RegisterWebhookRequest, RegisterWebhookResponse};
use crate::app_state::AppState;
use crate::domain::WebhookId;
use crate::error::{ErrorResponse, ReviewError};

/// `POST /webhooks` — Register an endpoint.
///
/// # Errors
///
/// Returns [`ReviewError::Validation`] for a bad URL or event list.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks",
    tag = "Webhooks",
    summary = "Register a webhook",
    description = "Subscribes an http(s) endpoint to review lifecycle events. Deliveries are signed with HMAC-SHA256 of the body using `secret`.",
    request_body = RegisterWebhookRequest,
    responses(
        (status = 201, description = "Webhook registered", body = RegisterWebhookResponse),
        (status = 400, description = "Invalid URL or events", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterWebhookRequest>,
) -> Result<impl IntoResponse, ReviewError> {
    let id = state
        .webhooks
        .register_webhook(&req.url, &req.events, &req.secret, req.tenant_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterWebhookResponse { id, url: req.url }),
    ))
}

/// `DELETE /webhooks/{id}` — Remove a registration.
///
/// # Errors
///
/// Returns [`ReviewError::NotFound`] if the registration does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/webhooks/{id}",
    tag = "Webhooks",
    summary = "Unregister a webhook",
    params(
        ("id" = uuid::Uuid, Path, description = "Registration UUID"),
    ),
    responses(
        (status = 204, description = "Webhook removed"),
        (status = 404, description = "Webhook not found", body = ErrorResponse),
    )
)]
pub async fn unregister(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ReviewError> {
    let id = WebhookId::from_uuid(id);
    if !state.webhooks.unregister_webhook(id).await? {
        return Err(ReviewError::NotFound(format!("webhook {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks", post(register))
        .route("/webhooks/{id}", delete(unregister))
}
