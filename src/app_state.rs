//! Shared application state injected into all Axum handlers, and the
//! wiring that builds it from a set of storage backends.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::EngineConfig;
use crate::domain::{EventBus, InvitationTask, WebhookDeliveryTask};
use crate::persistence::memory::{
    InMemoryQueue, InMemoryReviewStore, InMemoryStatsCache, InMemoryTargetStore,
    InMemoryUserStore, InMemoryVoteStore, InMemoryWebhookStore,
};
use crate::persistence::postgres::{PostgresPersistence, PostgresQueue};
use crate::persistence::{
    ReviewStore, StatsCache, TargetStore, TaskQueue, UserStore, VoteStore, WebhookStore,
};
use crate::service::{
    AggregationService, HelpfulnessService, InvitationService, Mailer, ModerationService,
    WebhookService, WebhookTransport,
};

/// Queue name of webhook delivery tasks.
pub const WEBHOOK_QUEUE: &str = "review_webhook_delivery";

/// Queue name of invitation tasks.
pub const INVITATION_QUEUE: &str = "review_invitation";

/// Every storage collaborator the services need.
#[derive(Debug, Clone)]
pub struct Backends {
    /// Review rows.
    pub reviews: Arc<dyn ReviewStore>,
    /// Review targets.
    pub targets: Arc<dyn TargetStore>,
    /// Helpfulness votes.
    pub votes: Arc<dyn VoteStore>,
    /// Webhook registrations.
    pub webhooks: Arc<dyn WebhookStore>,
    /// User accounts.
    pub users: Arc<dyn UserStore>,
    /// Stats cache.
    pub cache: Arc<dyn StatsCache>,
    /// Pending webhook deliveries.
    pub webhook_queue: Arc<dyn TaskQueue<WebhookDeliveryTask>>,
    /// Pending invitations.
    pub invitation_queue: Arc<dyn TaskQueue<InvitationTask>>,
}

impl Backends {
    /// Process-local backends; all state is lost on restart.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            reviews: Arc::new(InMemoryReviewStore::new()),
            targets: Arc::new(InMemoryTargetStore::new()),
            votes: Arc::new(InMemoryVoteStore::new()),
            webhooks: Arc::new(InMemoryWebhookStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
            cache: Arc::new(InMemoryStatsCache::new()),
            webhook_queue: Arc::new(InMemoryQueue::<WebhookDeliveryTask>::new()),
            invitation_queue: Arc::new(InMemoryQueue::<InvitationTask>::new()),
        }
    }

    /// PostgreSQL-backed stores, queues and stats cache, so every instance
    /// sharing the database sees the same cache invalidations.
    #[must_use]
    pub fn postgres(pool: PgPool, queue_lease: Duration) -> Self {
        let persistence = Arc::new(PostgresPersistence::new(pool.clone()));
        Self {
            reviews: Arc::clone(&persistence) as Arc<dyn ReviewStore>,
            targets: Arc::clone(&persistence) as Arc<dyn TargetStore>,
            votes: Arc::clone(&persistence) as Arc<dyn VoteStore>,
            webhooks: Arc::clone(&persistence) as Arc<dyn WebhookStore>,
            users: Arc::clone(&persistence) as Arc<dyn UserStore>,
            cache: persistence,
            webhook_queue: Arc::new(PostgresQueue::<WebhookDeliveryTask>::new(
                pool.clone(),
                WEBHOOK_QUEUE,
                queue_lease,
            )),
            invitation_queue: Arc::new(PostgresQueue::<InvitationTask>::new(
                pool,
                INVITATION_QUEUE,
                queue_lease,
            )),
        }
    }
}

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Rating statistics.
    pub aggregation: Arc<AggregationService>,
    /// Moderation decisions and lifecycle hooks.
    pub moderation: Arc<ModerationService>,
    /// Helpfulness voting.
    pub helpfulness: Arc<HelpfulnessService>,
    /// Webhook registrations and delivery.
    pub webhooks: Arc<WebhookService>,
    /// Invitation scheduling.
    pub invitations: Arc<InvitationService>,
    /// Lifecycle event bus.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires every service on top of `backends`.
    #[must_use]
    pub fn build(
        backends: &Backends,
        event_bus: EventBus,
        transport: Arc<dyn WebhookTransport>,
        mailer: Arc<dyn Mailer>,
        config: &EngineConfig,
    ) -> Self {
        let aggregation = Arc::new(AggregationService::new(
            Arc::clone(&backends.reviews),
            Arc::clone(&backends.targets),
            Arc::clone(&backends.cache),
        ));
        let moderation = Arc::new(ModerationService::new(
            Arc::clone(&backends.reviews),
            Arc::clone(&backends.targets),
            Arc::clone(&aggregation),
            event_bus.clone(),
        ));
        let helpfulness = Arc::new(HelpfulnessService::new(
            Arc::clone(&backends.reviews),
            Arc::clone(&backends.votes),
        ));
        let webhooks = Arc::new(WebhookService::new(
            Arc::clone(&backends.webhooks),
            Arc::clone(&backends.webhook_queue),
            transport,
            config.webhook_max_attempts,
        ));
        let invitations = Arc::new(InvitationService::new(
            Arc::clone(&backends.reviews),
            Arc::clone(&backends.users),
            Arc::clone(&backends.invitation_queue),
            mailer,
            config.invitation_default_delay_hours,
        ));

        Self {
            aggregation,
            moderation,
            helpfulness,
            webhooks,
            invitations,
            event_bus,
        }
    }
}
