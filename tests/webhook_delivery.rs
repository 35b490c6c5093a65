//! Webhook delivery over real HTTP to a local receiver.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_test::assert_ok;

use review_engine::domain::{ReviewKind, ReviewRecord, WebhookDeliveryTask};
use review_engine::persistence::memory::{InMemoryQueue, InMemoryWebhookStore};
use review_engine::persistence::TaskQueue;
use review_engine::service::webhook::verify_signature;
use review_engine::service::{worker, HttpTransport, WebhookService};

const SECRET: &str = "receiver-secret";

#[derive(Debug, Clone)]
struct Hit {
    path: &'static str,
    event: String,
    signature_valid: bool,
    body: serde_json::Value,
}

type Hits = Arc<Mutex<Vec<Hit>>>;

async fn record(hits: &Hits, path: &'static str, headers: &HeaderMap, body: &Bytes) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let signature = header("x-webhook-signature");
    hits.lock().await.push(Hit {
        path,
        event: header("x-webhook-event"),
        signature_valid: verify_signature(SECRET, body, &signature),
        body: serde_json::from_slice(body).unwrap_or(serde_json::Value::Null),
    });
}

async fn accept(State(hits): State<Hits>, headers: HeaderMap, body: Bytes) -> StatusCode {
    record(&hits, "/ok", &headers, &body).await;
    StatusCode::NO_CONTENT
}

async fn reject(State(hits): State<Hits>, headers: HeaderMap, body: Bytes) -> StatusCode {
    record(&hits, "/fail", &headers, &body).await;
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Starts the receiver and returns its base URL.
async fn spawn_receiver(hits: Hits) -> String {
    let app = Router::new()
        .route("/ok", post(accept))
        .route("/fail", post(reject))
        .with_state(hits);
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("receiver must bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("receiver must have an address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn service(queue: &Arc<InMemoryQueue<WebhookDeliveryTask>>) -> WebhookService {
    let Ok(transport) = HttpTransport::new(Duration::from_secs(5), Duration::from_secs(2)) else {
        panic!("http client must build");
    };
    WebhookService::new(
        Arc::new(InMemoryWebhookStore::new()),
        Arc::clone(queue) as Arc<dyn TaskQueue<WebhookDeliveryTask>>,
        Arc::new(transport),
        3,
    )
}

/// Runs deliveries until the queue is empty and returns how many ran.
async fn drain(service: &WebhookService, queue: &InMemoryQueue<WebhookDeliveryTask>) -> usize {
    let mut attempts = 0;
    while let Ok(true) = worker::deliver_next(service, queue).await {
        attempts += 1;
    }
    attempts
}

fn approved_review() -> ReviewRecord {
    ReviewRecord::new(15, ReviewKind::Agro, Some(4), 8, "producer_profile", Some(21))
}

#[tokio::test]
async fn signed_delivery_reaches_receiver() {
    let hits: Hits = Arc::default();
    let base = spawn_receiver(Arc::clone(&hits)).await;
    let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
    let service = service(&queue);

    assert_ok!(
        service
            .register_webhook(
                &format!("{base}/ok"),
                &["review.approved".to_string()],
                SECRET,
                None,
            )
            .await
    );

    let mut extra = serde_json::Map::new();
    extra.insert("previous_status".to_string(), serde_json::json!("pending"));
    assert_eq!(service.dispatch("review.approved", &approved_review(), &extra).await, 1);
    assert_eq!(service.dispatch("review.created", &approved_review(), &extra).await, 0);
    assert_eq!(drain(&service, &queue).await, 1);

    let hits = hits.lock().await;
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.path, "/ok");
    assert_eq!(hit.event, "review.approved");
    assert!(hit.signature_valid);
    assert_eq!(hit.body["event"], "review.approved");
    assert_eq!(hit.body["data"]["entity_id"], 15);
    assert_eq!(hit.body["data"]["rating"], 4);
    assert_eq!(hit.body["data"]["previous_status"], "pending");
}

#[tokio::test]
async fn failing_endpoint_is_retried_then_abandoned() {
    let hits: Hits = Arc::default();
    let base = spawn_receiver(Arc::clone(&hits)).await;
    let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
    let service = service(&queue);

    for path in ["fail", "ok"] {
        assert_ok!(
            service
                .register_webhook(
                    &format!("{base}/{path}"),
                    &["review.rejected".to_string()],
                    SECRET,
                    None,
                )
                .await
        );
    }

    let extra = serde_json::Map::new();
    assert_eq!(service.dispatch("review.rejected", &approved_review(), &extra).await, 2);
    assert_eq!(drain(&service, &queue).await, 4);
    assert!(queue.is_empty().await);

    let hits = hits.lock().await;
    assert_eq!(hits.iter().filter(|h| h.path == "/fail").count(), 3);
    assert_eq!(hits.iter().filter(|h| h.path == "/ok").count(), 1);
    assert!(hits.iter().all(|h| h.signature_valid));
}

#[tokio::test]
async fn unreachable_endpoint_counts_as_failure() {
    let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
    let service = service(&queue);

    // Bind then drop to get a port nobody listens on.
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("must bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("must have an address");
    };
    drop(listener);

    assert_ok!(
        service
            .register_webhook(
                &format!("http://{addr}/gone"),
                &["review.created".to_string()],
                SECRET,
                None,
            )
            .await
    );
    let extra = serde_json::Map::new();
    assert_eq!(service.dispatch("review.created", &approved_review(), &extra).await, 1);
    assert_eq!(drain(&service, &queue).await, 3);
}
