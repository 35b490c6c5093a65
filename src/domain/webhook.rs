//! Webhook registrations and delivery tasks.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ReviewEvent;

/// Unique identifier of a webhook registration.
///
/// Wraps a UUID v4 so registration ids cannot be confused with other
/// UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct WebhookId(uuid::Uuid);

impl WebhookId {
    /// Creates a new random `WebhookId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `WebhookId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for WebhookId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

/// An external endpoint subscribed to lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    /// Registration id.
    pub id: WebhookId,
    /// Target URL (validated `http`/`https`).
    pub url: String,
    /// Events this endpoint receives.
    pub subscribed_events: BTreeSet<ReviewEvent>,
    /// HMAC-SHA256 signing key.
    pub secret: String,
    /// Owning tenant.
    pub tenant_id: Option<u64>,
    /// Inactive registrations are skipped by dispatch.
    pub active: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl WebhookRegistration {
    /// Returns `true` when the registration is active and subscribed.
    #[must_use]
    pub fn wants(&self, event: ReviewEvent) -> bool {
        self.active && self.subscribed_events.contains(&event)
    }

    /// Returns `false` only when both the registration and the review are
    /// bound to tenants and the tenants differ.
    #[must_use]
    pub fn accepts_tenant(&self, review_tenant: Option<u64>) -> bool {
        match (self.tenant_id, review_tenant) {
            (Some(own), Some(other)) => own == other,
            _ => true,
        }
    }
}

/// One pending POST of one event to one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDeliveryTask {
    /// Registration the task belongs to.
    pub webhook_id: WebhookId,
    /// Endpoint URL, copied at dispatch time.
    pub url: String,
    /// Signing key, copied at dispatch time.
    pub secret: String,
    /// Event name sent in `X-Webhook-Event`.
    pub event: ReviewEvent,
    /// JSON body.
    pub payload: serde_json::Value,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl WebhookDeliveryTask {
    /// The same task, scheduled for its next attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(active: bool) -> WebhookRegistration {
        WebhookRegistration {
            id: WebhookId::new(),
            url: "https://hooks.example.com/reviews".to_string(),
            subscribed_events: [ReviewEvent::Approved].into(),
            secret: "s3cret".to_string(),
            tenant_id: None,
            active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(WebhookId::new(), WebhookId::new());
    }

    #[test]
    fn id_serializes_transparently() {
        let uuid = uuid::Uuid::new_v4();
        let json = serde_json::to_string(&WebhookId::from_uuid(uuid)).unwrap_or_default();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn wants_requires_subscription_and_active() {
        assert!(registration(true).wants(ReviewEvent::Approved));
        assert!(!registration(true).wants(ReviewEvent::Rejected));
        assert!(!registration(false).wants(ReviewEvent::Approved));
    }

    #[test]
    fn tenant_binding_filters_other_tenants() {
        let mut bound = registration(true);
        bound.tenant_id = Some(4);
        assert!(bound.accepts_tenant(Some(4)));
        assert!(!bound.accepts_tenant(Some(5)));
        assert!(bound.accepts_tenant(None));
        assert!(registration(true).accepts_tenant(Some(5)));
    }

    #[test]
    fn next_attempt_increments_only_attempt() {
        let task = WebhookDeliveryTask {
            webhook_id: WebhookId::new(),
            url: "https://hooks.example.com".to_string(),
            secret: "k".to_string(),
            event: ReviewEvent::Created,
            payload: serde_json::json!({"event": "review.created"}),
            attempt: 1,
        };
        let next = task.next_attempt();
        assert_eq!(next.attempt, 2);
        assert_eq!(next.payload, task.payload);
        assert_eq!(next.webhook_id, task.webhook_id);
    }
}
