//! Webhook registration, dispatch and signed delivery.
//!
//! Dispatch only enqueues [`WebhookDeliveryTask`]s; the network call happens
//! in [`WebhookService::deliver`], which the webhook worker drives. A failed
//! attempt is re-enqueued until the attempt limit, then dropped.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::{
    LifecycleEvent, ReviewEvent, ReviewRecord, WebhookDeliveryTask, WebhookId,
    WebhookRegistration,
};
use crate::error::ReviewError;
use crate::persistence::{TaskQueue, WebhookStore};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `X-Webhook-Signature` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// `User-Agent` of outbound deliveries.
pub const USER_AGENT: &str = concat!("review-engine-webhook/", env!("CARGO_PKG_VERSION"));

/// Computes the `X-Webhook-Signature` header value for `body`.
///
/// # Errors
///
/// Returns [`ReviewError::Internal`] if the MAC cannot be keyed.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, ReviewError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ReviewError::Internal(format!("hmac key: {e}")))?;
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Checks a received `X-Webhook-Signature` header in constant time.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(signature_hex) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Builds the delivery body of `event` for `review`.
///
/// `extra` fields are merged into `data` after the standard ones and may
/// override them.
#[must_use]
pub fn build_payload(
    event: ReviewEvent,
    review: &ReviewRecord,
    extra: &serde_json::Map<String, serde_json::Value>,
    timestamp: DateTime<Utc>,
) -> serde_json::Value {
    let mut data = serde_json::Map::new();
    data.insert(
        "entity_type".to_string(),
        serde_json::Value::from(review.kind.schema().table),
    );
    data.insert("entity_id".to_string(), serde_json::Value::from(review.id));
    data.insert(
        "rating".to_string(),
        review
            .rating
            .map_or(serde_json::Value::Null, serde_json::Value::from),
    );
    for (key, value) in extra {
        data.insert(key.clone(), value.clone());
    }

    serde_json::json!({
        "event": event.as_str(),
        "timestamp": timestamp.to_rfc3339(),
        "data": data,
    })
}

/// Outbound HTTP seam of the delivery path.
#[async_trait]
pub trait WebhookTransport: Send + Sync + fmt::Debug {
    /// POSTs `body` to `url` and returns the HTTP status code.
    ///
    /// # Errors
    ///
    /// Transport failures (DNS, connect, timeout) are
    /// [`ReviewError::Delivery`].
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: Vec<u8>,
    ) -> Result<u16, ReviewError>;
}

/// [`WebhookTransport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client with the given request and connect timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Internal`] if the TLS backend fails to
    /// initialise.
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ReviewError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ReviewError::Internal(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: Vec<u8>,
    ) -> Result<u16, ReviewError> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ReviewError::Delivery(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Manages registrations and turns lifecycle events into signed POSTs.
#[derive(Debug, Clone)]
pub struct WebhookService {
    store: Arc<dyn WebhookStore>,
    queue: Arc<dyn TaskQueue<WebhookDeliveryTask>>,
    transport: Arc<dyn WebhookTransport>,
    max_attempts: u32,
}

impl WebhookService {
    /// Creates a new `WebhookService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn WebhookStore>,
        queue: Arc<dyn TaskQueue<WebhookDeliveryTask>>,
        transport: Arc<dyn WebhookTransport>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            queue,
            transport,
            max_attempts,
        }
    }

    /// Registers an endpoint for the given events.
    ///
    /// Unknown event names are dropped; at least one known name must
    /// remain.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] for a non-`http(s)` or hostless
    /// URL, or when no known event is requested.
    pub async fn register_webhook(
        &self,
        url: &str,
        events: &[String],
        secret: &str,
        tenant_id: Option<u64>,
    ) -> Result<WebhookId, ReviewError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ReviewError::Validation(format!("invalid webhook url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ReviewError::Validation(format!(
                "webhook url must be http(s) with a host: {url}"
            )));
        }

        let subscribed_events: BTreeSet<ReviewEvent> = events
            .iter()
            .filter_map(|name| name.parse::<ReviewEvent>().ok())
            .collect();
        if subscribed_events.is_empty() {
            return Err(ReviewError::Validation(
                "no supported events requested".to_string(),
            ));
        }

        let registration = WebhookRegistration {
            id: WebhookId::new(),
            url: url.to_string(),
            subscribed_events,
            secret: secret.to_string(),
            tenant_id,
            active: true,
            created_at: Utc::now(),
        };
        let id = registration.id;
        self.store.insert(registration).await?;

        tracing::info!(webhook_id = %id, url, "webhook registered");
        Ok(id)
    }

    /// Removes a registration. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn unregister_webhook(&self, id: WebhookId) -> Result<bool, ReviewError> {
        let removed = self.store.delete(id).await?;
        if removed {
            tracing::info!(webhook_id = %id, "webhook unregistered");
        }
        Ok(removed)
    }

    /// Enqueues one delivery per active registration subscribed to `event`.
    ///
    /// A registration bound to a tenant only receives reviews of that
    /// tenant; reviews without a tenant go to every subscriber.
    ///
    /// Returns the number of tasks enqueued; an unknown event name yields 0.
    /// Performs no network I/O.
    pub async fn dispatch(
        &self,
        event: &str,
        review: &ReviewRecord,
        extra: &serde_json::Map<String, serde_json::Value>,
    ) -> usize {
        let Ok(event) = event.parse::<ReviewEvent>() else {
            tracing::debug!(event, "ignoring unsupported webhook event");
            return 0;
        };
        let payload = build_payload(event, review, extra, Utc::now());
        self.dispatch_payload(event, review.tenant_id, payload).await
    }

    /// [`Self::dispatch`] for an event taken off the event bus.
    pub async fn dispatch_event(&self, event: &LifecycleEvent) -> usize {
        let payload = build_payload(event.event, &event.review, &event.extra, event.timestamp);
        self.dispatch_payload(event.event, event.review.tenant_id, payload)
            .await
    }

    async fn dispatch_payload(
        &self,
        event: ReviewEvent,
        tenant_id: Option<u64>,
        payload: serde_json::Value,
    ) -> usize {
        let registrations = match self.store.list_active().await {
            Ok(registrations) => registrations,
            Err(e) => {
                tracing::error!(event = %event, error = %e, "webhook lookup failed");
                return 0;
            }
        };

        let mut enqueued = 0;
        let matching = registrations
            .into_iter()
            .filter(|r| r.wants(event) && r.accepts_tenant(tenant_id));
        for registration in matching {
            let task = WebhookDeliveryTask {
                webhook_id: registration.id,
                url: registration.url,
                secret: registration.secret,
                event,
                payload: payload.clone(),
                attempt: 1,
            };
            match self.queue.enqueue(task).await {
                Ok(()) => enqueued += 1,
                Err(e) => tracing::error!(
                    webhook_id = %registration.id,
                    event = %event,
                    error = %e,
                    "webhook enqueue failed"
                ),
            }
        }
        enqueued
    }

    /// Performs one delivery attempt. Returns `true` on a 2xx response.
    ///
    /// A failed attempt below the attempt limit is re-enqueued with the
    /// next attempt number; the final failed attempt is dropped.
    pub async fn deliver(&self, task: WebhookDeliveryTask) -> bool {
        let (http_code, success) = match self.attempt(&task).await {
            Ok(code) => (code, (200..300).contains(&code)),
            Err(e) => {
                tracing::debug!(webhook_id = %task.webhook_id, error = %e, "delivery error");
                (0, false)
            }
        };

        tracing::info!(
            webhook_id = %task.webhook_id,
            event = %task.event,
            http_code,
            success,
            attempt = task.attempt,
            "webhook delivery attempted"
        );

        if success {
            return true;
        }

        if task.attempt < self.max_attempts {
            let next = task.next_attempt();
            if let Err(e) = self.queue.enqueue(next).await {
                tracing::error!(webhook_id = %task.webhook_id, error = %e, "webhook retry enqueue failed");
            }
        } else {
            tracing::warn!(
                webhook_id = %task.webhook_id,
                event = %task.event,
                attempt = task.attempt,
                "webhook delivery abandoned"
            );
        }
        false
    }

    async fn attempt(&self, task: &WebhookDeliveryTask) -> Result<u16, ReviewError> {
        // serde_json maps keep keys sorted unless `preserve_order` is enabled;
        // `payload_bytes_are_key_sorted` pins the order.
        let body = serde_json::to_vec(&task.payload)?;
        let signature = sign_payload(&task.secret, &body)?;
        let headers = [
            ("Content-Type", "application/json".to_string()),
            ("X-Webhook-Event", task.event.as_str().to_string()),
            ("X-Webhook-Signature", signature),
        ];
        self.transport.post(&task.url, &headers, body).await
    }
}
