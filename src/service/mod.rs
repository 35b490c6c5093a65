//! Service layer: business logic orchestration.
//!
//! Each service holds its collaborators as `Arc<dyn Trait>` so the same
//! logic runs on the in-memory and PostgreSQL backends. Lifecycle changes
//! are announced through the [`super::domain::EventBus`]; the
//! [`worker`] module forwards them to [`WebhookService`] and drains the
//! task queues.

pub mod aggregation;
pub mod helpfulness;
pub mod invitation;
pub mod mailer;
pub mod moderation;
pub mod webhook;
pub mod worker;

pub use aggregation::AggregationService;
pub use helpfulness::HelpfulnessService;
pub use invitation::InvitationService;
pub use mailer::{LogMailer, Mailer};
pub use moderation::ModerationService;
pub use webhook::{HttpTransport, WebhookService, WebhookTransport};
