//! Background tasks: queue consumers and the event forwarder.
//!
//! Consumers claim a task, process it and only then ack the claim. A worker
//! that dies mid-task leaves the claim to expire, after which another
//! worker picks the task up again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{EventBus, InvitationOutcome, InvitationTask, WebhookDeliveryTask};
use crate::error::ReviewError;
use crate::persistence::TaskQueue;
use crate::service::{InvitationService, WebhookService};

/// Spawns the loop that feeds every bus event to [`WebhookService::dispatch_event`].
///
/// The subscription is taken before the task starts, so no event published
/// after this call returns is missed.
pub fn spawn_event_forwarder(
    webhooks: Arc<WebhookService>,
    event_bus: &EventBus,
) -> JoinHandle<()> {
    let mut event_rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let enqueued = webhooks.dispatch_event(&event).await;
                    tracing::debug!(
                        event = %event.event,
                        review_id = event.review.id,
                        enqueued,
                        "lifecycle event forwarded"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "webhook forwarder lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("webhook forwarder stopped");
    })
}

/// Claims one webhook task, attempts it and acks the claim.
///
/// A failed attempt is re-enqueued by [`WebhookService::deliver`] as a new
/// task before the claim is acked. Returns `false` when nothing was
/// claimable.
///
/// # Errors
///
/// Returns [`ReviewError::Persistence`] if the claim or ack fails.
pub async fn deliver_next(
    webhooks: &WebhookService,
    queue: &dyn TaskQueue<WebhookDeliveryTask>,
) -> Result<bool, ReviewError> {
    let Some(claimed) = queue.claim().await? else {
        return Ok(false);
    };
    let _ = webhooks.deliver(claimed.task).await;
    queue.ack(claimed.receipt).await?;
    Ok(true)
}

/// Claims one invitation task, processes it and acks the claim.
///
/// Returns `None` when nothing was claimable.
///
/// # Errors
///
/// Propagates claim, processing and ack failures. A task whose processing
/// failed is left unacked and is claimed again once its lease expires.
pub async fn process_next_invitation(
    invitations: &InvitationService,
    queue: &dyn TaskQueue<InvitationTask>,
) -> Result<Option<InvitationOutcome>, ReviewError> {
    let Some(claimed) = queue.claim().await? else {
        return Ok(None);
    };
    let outcome = invitations.process_invitation(claimed.task).await?;
    queue.ack(claimed.receipt).await?;
    Ok(Some(outcome))
}

/// Spawns the webhook delivery consumer.
pub fn spawn_webhook_worker(
    webhooks: Arc<WebhookService>,
    queue: Arc<dyn TaskQueue<WebhookDeliveryTask>>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match deliver_next(&webhooks, queue.as_ref()).await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    tracing::error!(error = %e, "webhook queue claim failed");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    })
}

/// Spawns the invitation consumer.
///
/// Deferred tasks go back on the queue, so the loop sleeps whenever a pass
/// only deferred work.
pub fn spawn_invitation_worker(
    invitations: Arc<InvitationService>,
    queue: Arc<dyn TaskQueue<InvitationTask>>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match process_next_invitation(&invitations, queue.as_ref()).await {
                Ok(Some(InvitationOutcome::Deferred) | None) => {
                    tokio::time::sleep(poll_interval).await;
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    tracing::error!(error = %e, "invitation task failed");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::domain::{
        LifecycleEvent, ReviewEvent, ReviewKind, ReviewRecord, UserAccount, Vertical, WebhookId,
    };
    use crate::persistence::memory::{
        InMemoryQueue, InMemoryReviewStore, InMemoryStatsCache, InMemoryTargetStore,
        InMemoryUserStore, InMemoryWebhookStore,
    };
    use crate::persistence::{ReviewStore, TargetStore, UserStore};
    use crate::service::{AggregationService, Mailer, ModerationService, WebhookTransport};
    use crate::service::mailer::RecordingMailer;
    use crate::service::webhook::HttpTransport;

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait]
    impl WebhookTransport for Unreachable {
        async fn post(
            &self,
            url: &str,
            _headers: &[(&'static str, String)],
            _body: Vec<u8>,
        ) -> Result<u16, ReviewError> {
            Err(ReviewError::Delivery(format!("unreachable: {url}")))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingTransport {
        events: tokio::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn post(
            &self,
            _url: &str,
            headers: &[(&'static str, String)],
            _body: Vec<u8>,
        ) -> Result<u16, ReviewError> {
            if let Some((_, event)) = headers.iter().find(|(name, _)| *name == "X-Webhook-Event") {
                self.events.lock().await.push(event.clone());
            }
            Ok(204)
        }
    }

    #[derive(Debug)]
    struct BrokenUsers;

    #[async_trait]
    impl UserStore for BrokenUsers {
        async fn load_user(&self, _id: u64) -> Result<Option<UserAccount>, ReviewError> {
            Err(ReviewError::Persistence("connection reset".to_string()))
        }
    }

    fn webhook_service(
        queue: &Arc<InMemoryQueue<WebhookDeliveryTask>>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Arc<WebhookService> {
        Arc::new(WebhookService::new(
            Arc::new(InMemoryWebhookStore::new()),
            Arc::clone(queue) as Arc<dyn TaskQueue<WebhookDeliveryTask>>,
            transport,
            3,
        ))
    }

    fn invitation_service(
        users: Arc<dyn UserStore>,
        queue: &Arc<InMemoryQueue<InvitationTask>>,
    ) -> InvitationService {
        InvitationService::new(
            Arc::new(InMemoryReviewStore::new()) as Arc<dyn ReviewStore>,
            users,
            Arc::clone(queue) as Arc<dyn TaskQueue<InvitationTask>>,
            Arc::new(RecordingMailer::new()) as Arc<dyn Mailer>,
            72,
        )
    }

    fn due_invitation(user_id: u64) -> InvitationTask {
        InvitationTask {
            vertical: Vertical::Training,
            transaction_id: 9,
            user_id,
            send_after: Utc::now() - chrono::Duration::minutes(1),
            review_kind: ReviewKind::Course,
        }
    }

    async fn wait_for_task(queue: &InMemoryQueue<WebhookDeliveryTask>) {
        for _ in 0..50 {
            if !queue.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn forwarder_turns_bus_events_into_tasks() {
        let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
        let Ok(transport) = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1)) else {
            panic!("http client must build");
        };
        let webhooks = webhook_service(&queue, Arc::new(transport));
        let _ = webhooks
            .register_webhook(
                "https://hooks.example.com",
                &["review.created".to_string()],
                "k",
                None,
            )
            .await;

        let bus = EventBus::new(16);
        let handle = spawn_event_forwarder(Arc::clone(&webhooks), &bus);
        let review = ReviewRecord::new(1, ReviewKind::Agro, Some(5), 2, "producer_profile", Some(3));
        let _ = bus.publish(LifecycleEvent::new(ReviewEvent::Created, review));

        wait_for_task(&queue).await;
        assert_eq!(queue.len().await, 1);
        handle.abort();
    }

    #[tokio::test]
    async fn created_review_reaches_registered_webhook() {
        let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
        let transport = Arc::new(RecordingTransport::default());
        let webhooks =
            webhook_service(&queue, Arc::clone(&transport) as Arc<dyn WebhookTransport>);
        let _ = webhooks
            .register_webhook(
                "https://hooks.example.com/reviews",
                &["review.created".to_string()],
                "k",
                None,
            )
            .await;

        let reviews: Arc<dyn ReviewStore> = Arc::new(InMemoryReviewStore::new());
        let targets: Arc<dyn TargetStore> = Arc::new(InMemoryTargetStore::new());
        let bus = EventBus::new(16);
        let moderation = ModerationService::new(
            Arc::clone(&reviews),
            Arc::clone(&targets),
            Arc::new(AggregationService::new(
                reviews,
                targets,
                Arc::new(InMemoryStatsCache::new()),
            )),
            bus.clone(),
        );
        let handle = spawn_event_forwarder(Arc::clone(&webhooks), &bus);

        let review = ReviewRecord::new(21, ReviewKind::Course, Some(4), 6, "", Some(2));
        moderation.on_review_created(&review);

        wait_for_task(&queue).await;
        let Ok(Some(claimed)) = queue.claim().await else {
            panic!("creation must queue a delivery");
        };
        assert_eq!(claimed.task.event, ReviewEvent::Created);
        assert_eq!(claimed.task.payload["data"]["entity_id"], 21);
        assert!(webhooks.deliver(claimed.task).await);
        let _ = queue.ack(claimed.receipt).await;

        assert_eq!(*transport.events.lock().await, vec!["review.created".to_string()]);
        assert!(queue.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn failed_delivery_is_acked_and_replaced_by_its_retry() {
        let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
        let webhooks = webhook_service(&queue, Arc::new(Unreachable));
        let _ = queue
            .enqueue(WebhookDeliveryTask {
                webhook_id: WebhookId::new(),
                url: "https://down.example.com".to_string(),
                secret: "k".to_string(),
                event: ReviewEvent::Approved,
                payload: serde_json::json!({"event": "review.approved"}),
                attempt: 1,
            })
            .await;

        let delivered = deliver_next(&webhooks, queue.as_ref()).await;
        assert!(matches!(delivered, Ok(true)));

        // Only the retry is left; the original claim was acked.
        assert_eq!(queue.len().await, 1);
        let Ok(Some(retry)) = queue.claim().await else {
            panic!("retry must be queued");
        };
        assert_eq!(retry.task.attempt, 2);
    }

    #[tokio::test]
    async fn empty_webhook_queue_reports_nothing_claimed() {
        let queue: Arc<InMemoryQueue<WebhookDeliveryTask>> = Arc::new(InMemoryQueue::new());
        let webhooks = webhook_service(&queue, Arc::new(Unreachable));
        assert!(matches!(deliver_next(&webhooks, queue.as_ref()).await, Ok(false)));
    }

    #[tokio::test]
    async fn processed_invitation_is_acked() {
        let queue: Arc<InMemoryQueue<InvitationTask>> = Arc::new(InMemoryQueue::new());
        let users = Arc::new(InMemoryUserStore::new());
        users
            .insert(UserAccount {
                id: 4,
                blocked: false,
                email: "lu@example.com".to_string(),
                display_name: "Lu".to_string(),
                preferred_language: "en".to_string(),
            })
            .await;
        let invitations = invitation_service(users, &queue);
        let _ = queue.enqueue(due_invitation(4)).await;

        let outcome = process_next_invitation(&invitations, queue.as_ref()).await;
        assert!(matches!(outcome, Ok(Some(InvitationOutcome::Sent))));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn failed_invitation_is_claimed_again_after_lease() {
        let queue: Arc<InMemoryQueue<InvitationTask>> =
            Arc::new(InMemoryQueue::with_lease(Duration::ZERO));
        let invitations = invitation_service(Arc::new(BrokenUsers), &queue);
        let task = due_invitation(4);
        let _ = queue.enqueue(task.clone()).await;

        let outcome = process_next_invitation(&invitations, queue.as_ref()).await;
        assert!(matches!(outcome, Err(ReviewError::Persistence(_))));
        assert_eq!(queue.len().await, 1);

        let Ok(Some(again)) = queue.claim().await else {
            panic!("unacked task must come back");
        };
        assert_eq!(again.task, task);
    }
}
