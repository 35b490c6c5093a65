//! Domain layer: review kinds, records, stats, votes, events and tasks.
//!
//! This module contains the engine's domain model: the schema adapter that
//! maps the five review families onto one shape, the derived stats and
//! vote types, listings and abuse reports, the lifecycle event system, and
//! the queue items of the webhook and invitation workers.

pub mod abuse_report;
pub mod event_bus;
pub mod helpful_vote;
pub mod invitation;
pub mod review;
pub mod review_event;
pub mod review_kind;
pub mod review_list;
pub mod target_stats;
pub mod user;
pub mod webhook;

pub use abuse_report::{AbuseReason, AbuseReport};
pub use event_bus::EventBus;
pub use helpful_vote::{VoteChange, VoteKey, VoteSummary, VoteTally, VoteType, wilson_lower_bound};
pub use invitation::{InvitationOutcome, InvitationTask, Vertical};
pub use review::{ReviewRecord, ReviewStatus, TargetRef};
pub use review_event::{LifecycleEvent, ReviewEvent};
pub use review_kind::{KindSchema, ReviewKind, TargetSpec, TargetTypeSchema};
pub use review_list::{ListedReview, ReviewListQuery, ReviewPage, ReviewSort};
pub use target_stats::TargetStats;
pub use user::UserAccount;
pub use webhook::{WebhookDeliveryTask, WebhookId, WebhookRegistration};
