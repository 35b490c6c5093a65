//! Webhook registration bodies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::WebhookId;

/// Body of `POST /webhooks`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterWebhookRequest {
    /// Endpoint URL (`http` or `https`).
    pub url: String,
    /// Event names, e.g. `["review.approved"]`. Unknown names are ignored.
    pub events: Vec<String>,
    /// HMAC signing key shared with the receiver.
    pub secret: String,
    /// Owning tenant.
    #[serde(default)]
    pub tenant_id: Option<u64>,
}

/// Response of `POST /webhooks`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegisterWebhookResponse {
    /// New registration id.
    pub id: WebhookId,
    /// Registered URL.
    pub url: String,
}
