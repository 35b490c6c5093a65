//! Persistence layer: storage traits and their backends.
//!
//! The services only talk to the traits below. [`memory`] holds the
//! in-process implementations used by tests and by the persistence-disabled
//! mode; [`postgres`] holds the `sqlx::PgPool` implementations whose SQL is
//! generated from the schema adapter.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::domain::{
    AbuseReport, ListedReview, ReviewKind, ReviewListQuery, ReviewRecord, ReviewStatus, TargetRef,
    TargetStats, UserAccount, VoteChange, VoteKey, VoteTally, VoteType, WebhookId,
    WebhookRegistration,
};
use crate::error::ReviewError;
use models::TargetRecord;

/// Keyed access to review rows of every kind.
#[async_trait]
pub trait ReviewStore: Send + Sync + fmt::Debug {
    /// Loads one review, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn load(&self, kind: ReviewKind, id: u64) -> Result<Option<ReviewRecord>, ReviewError>;

    /// Persists a new moderation status.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn update_status(
        &self,
        kind: ReviewKind,
        id: u64,
        status: ReviewStatus,
    ) -> Result<(), ReviewError>;

    /// Raw ratings of approved reviews of `kind` about `target`.
    ///
    /// For polymorphic kinds both the target id and type must match.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn approved_ratings(
        &self,
        kind: ReviewKind,
        target: &TargetRef,
    ) -> Result<Vec<i64>, ReviewError>;

    /// Reviews in `status`, oldest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn list_by_status(
        &self,
        kind: ReviewKind,
        status: ReviewStatus,
        tenant_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, ReviewError>;

    /// Number of reviews in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn count_by_status(
        &self,
        kind: ReviewKind,
        status: ReviewStatus,
        tenant_id: Option<u64>,
    ) -> Result<u64, ReviewError>;

    /// Whether `author_id` has any review of `kind` whose target field
    /// equals `target_id`, regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn has_review_by_author(
        &self,
        kind: ReviewKind,
        author_id: u64,
        target_id: u64,
    ) -> Result<bool, ReviewError>;

    /// Stores the target owner's response.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn set_owner_response(
        &self,
        kind: ReviewKind,
        id: u64,
        text: &str,
    ) -> Result<(), ReviewError>;

    /// Writes the denormalized helpfulness columns.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn write_helpfulness(
        &self,
        kind: ReviewKind,
        id: u64,
        tally: VoteTally,
        wilson_score: f64,
    ) -> Result<(), ReviewError>;

    /// One page of approved reviews matching `query`, in its sort order,
    /// together with the number of matches across all pages.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn list_approved(
        &self,
        kind: ReviewKind,
        query: &ReviewListQuery,
    ) -> Result<(Vec<ListedReview>, u64), ReviewError>;

    /// Stores an abuse report. Returns `false` when the reporter already
    /// reported this review.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn record_report(&self, report: &AbuseReport) -> Result<bool, ReviewError>;
}

/// Access to the entities reviews are about.
#[async_trait]
pub trait TargetStore: Send + Sync + fmt::Debug {
    /// Loads a target, `None` for unknown types or ids.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn load(&self, target: &TargetRef) -> Result<Option<TargetRecord>, ReviewError>;

    /// Writes `average_rating` / `total_reviews`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn write_rating_summary(
        &self,
        target: &TargetRef,
        average: f64,
        total: u64,
    ) -> Result<(), ReviewError>;
}

/// Helpfulness votes, unique per (kind, review, user).
#[async_trait]
pub trait VoteStore: Send + Sync + fmt::Debug {
    /// Inserts, replaces or retracts the user's vote in one atomic step.
    ///
    /// Casting the stored vote again removes it; casting the other type
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn apply_vote(&self, key: VoteKey, vote: VoteType) -> Result<VoteChange, ReviewError>;

    /// Counts the votes of one review.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn tally(&self, kind: ReviewKind, review_id: u64) -> Result<VoteTally, ReviewError>;
}

/// Webhook registrations.
#[async_trait]
pub trait WebhookStore: Send + Sync + fmt::Debug {
    /// Stores a new registration.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn insert(&self, registration: WebhookRegistration) -> Result<(), ReviewError>;

    /// Deletes a registration, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn delete(&self, id: WebhookId) -> Result<bool, ReviewError>;

    /// All active registrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn list_active(&self) -> Result<Vec<WebhookRegistration>, ReviewError>;
}

/// Tag-invalidated cache of [`TargetStats`].
#[async_trait]
pub trait StatsCache: Send + Sync + fmt::Debug {
    /// Cached stats for `key`, if present.
    async fn get(&self, key: &str) -> Option<TargetStats>;

    /// Stores stats with no expiry, tagged for later invalidation.
    async fn set(&self, key: &str, stats: TargetStats, tags: &[String]);

    /// Drops every entry carrying any of `tags`.
    async fn invalidate_tags(&self, tags: &[String]);
}

/// A task taken off a [`TaskQueue`] under a lease.
///
/// The task stays stored until [`TaskQueue::ack`] is called with its
/// receipt. If the lease runs out first, the task is handed out again.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask<T> {
    /// Handle for [`TaskQueue::ack`].
    pub receipt: u64,
    /// The claimed task.
    pub task: T,
}

/// At-least-once task queue with leased claims.
#[async_trait]
pub trait TaskQueue<T>: Send + Sync + fmt::Debug
where
    T: Send + 'static,
{
    /// Appends a task.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn enqueue(&self, item: T) -> Result<(), ReviewError>;

    /// Leases the oldest claimable task, `None` when there is none.
    ///
    /// Tasks whose lease expired without an ack are claimable again.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn claim(&self) -> Result<Option<ClaimedTask<T>>, ReviewError>;

    /// Removes a claimed task for good. Unknown receipts are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn ack(&self, receipt: u64) -> Result<(), ReviewError>;
}

/// Read access to user accounts.
#[async_trait]
pub trait UserStore: Send + Sync + fmt::Debug {
    /// Loads a user, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Persistence`] if the backend fails.
    async fn load_user(&self, id: u64) -> Result<Option<UserAccount>, ReviewError>;
}
