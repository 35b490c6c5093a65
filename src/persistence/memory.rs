//! In-memory implementations of the storage traits.
//!
//! Each store keeps its rows in a map behind a [`tokio::sync::RwLock`]. All
//! state is lost on restart. Mutations that must be atomic (vote toggling,
//! queue claims) happen inside a single write-lock section.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::models::TargetRecord;
use super::{ClaimedTask, ReviewStore, StatsCache, TargetStore, TaskQueue, UserStore, VoteStore, WebhookStore};
use crate::domain::{
    AbuseReport, ListedReview, ReviewKind, ReviewListQuery, ReviewRecord, ReviewStatus, TargetRef,
    TargetStats, UserAccount, VoteChange, VoteKey, VoteTally, VoteType, WebhookId,
    WebhookRegistration,
};
use crate::error::ReviewError;

/// Denormalized helpfulness columns of one review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelpfulnessColumns {
    /// `helpful_count` column.
    pub helpful_count: u64,
    /// `not_helpful_count` column.
    pub not_helpful_count: u64,
    /// `wilson_score` column.
    pub wilson_score: f64,
}

/// In-memory review rows of every kind.
#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    reviews: RwLock<BTreeMap<(ReviewKind, u64), ReviewRecord>>,
    helpfulness: RwLock<HashMap<(ReviewKind, u64), HelpfulnessColumns>>,
    reports: RwLock<HashMap<(ReviewKind, u64, u64), AbuseReport>>,
}

impl InMemoryReviewStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a review.
    pub async fn insert(&self, review: ReviewRecord) {
        self.reviews
            .write()
            .await
            .insert((review.kind, review.id), review);
    }

    /// Removes a review, returning it.
    pub async fn remove(&self, kind: ReviewKind, id: u64) -> Option<ReviewRecord> {
        self.reviews.write().await.remove(&(kind, id))
    }

    /// Denormalized helpfulness columns written for a review.
    pub async fn helpfulness(&self, kind: ReviewKind, id: u64) -> Option<HelpfulnessColumns> {
        self.helpfulness.read().await.get(&(kind, id)).copied()
    }

    /// Abuse reports filed against a review.
    pub async fn reports(&self, kind: ReviewKind, id: u64) -> Vec<AbuseReport> {
        self.reports
            .read()
            .await
            .values()
            .filter(|r| r.kind == kind && r.review_id == id)
            .cloned()
            .collect()
    }
}

fn in_tenant(review: &ReviewRecord, tenant_id: Option<u64>) -> bool {
    tenant_id.is_none_or(|tenant| review.tenant_id == Some(tenant))
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn load(&self, kind: ReviewKind, id: u64) -> Result<Option<ReviewRecord>, ReviewError> {
        Ok(self.reviews.read().await.get(&(kind, id)).cloned())
    }

    async fn update_status(
        &self,
        kind: ReviewKind,
        id: u64,
        status: ReviewStatus,
    ) -> Result<(), ReviewError> {
        let mut reviews = self.reviews.write().await;
        let review = reviews
            .get_mut(&(kind, id))
            .ok_or_else(|| ReviewError::NotFound(format!("review {kind}/{id}")))?;
        review.status = status;
        Ok(())
    }

    async fn approved_ratings(
        &self,
        kind: ReviewKind,
        target: &TargetRef,
    ) -> Result<Vec<i64>, ReviewError> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .values()
            .filter(|r| r.kind == kind && r.status == ReviewStatus::Approved)
            .filter(|r| r.target().as_ref() == Some(target))
            .filter_map(|r| r.rating.map(i64::from))
            .collect())
    }

    async fn list_by_status(
        &self,
        kind: ReviewKind,
        status: ReviewStatus,
        tenant_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, ReviewError> {
        let reviews = self.reviews.read().await;
        let mut matching: Vec<ReviewRecord> = reviews
            .values()
            .filter(|r| r.kind == kind && r.status == status && in_tenant(r, tenant_id))
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.created_at, r.id));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn count_by_status(
        &self,
        kind: ReviewKind,
        status: ReviewStatus,
        tenant_id: Option<u64>,
    ) -> Result<u64, ReviewError> {
        let reviews = self.reviews.read().await;
        let count = reviews
            .values()
            .filter(|r| r.kind == kind && r.status == status && in_tenant(r, tenant_id))
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn has_review_by_author(
        &self,
        kind: ReviewKind,
        author_id: u64,
        target_id: u64,
    ) -> Result<bool, ReviewError> {
        let reviews = self.reviews.read().await;
        Ok(reviews.values().any(|r| {
            r.kind == kind && r.author_id == author_id && r.target_id == Some(target_id)
        }))
    }

    async fn set_owner_response(
        &self,
        kind: ReviewKind,
        id: u64,
        text: &str,
    ) -> Result<(), ReviewError> {
        let mut reviews = self.reviews.write().await;
        let review = reviews
            .get_mut(&(kind, id))
            .ok_or_else(|| ReviewError::NotFound(format!("review {kind}/{id}")))?;
        review.owner_response = Some(text.to_string());
        Ok(())
    }

    async fn write_helpfulness(
        &self,
        kind: ReviewKind,
        id: u64,
        tally: VoteTally,
        wilson_score: f64,
    ) -> Result<(), ReviewError> {
        self.helpfulness.write().await.insert(
            (kind, id),
            HelpfulnessColumns {
                helpful_count: tally.helpful,
                not_helpful_count: tally.not_helpful,
                wilson_score,
            },
        );
        Ok(())
    }

    async fn list_approved(
        &self,
        kind: ReviewKind,
        query: &ReviewListQuery,
    ) -> Result<(Vec<ListedReview>, u64), ReviewError> {
        let reviews = self.reviews.read().await;
        let helpfulness = self.helpfulness.read().await;
        let mut matching: Vec<ListedReview> = reviews
            .values()
            .filter(|r| r.kind == kind && r.status == ReviewStatus::Approved)
            .filter(|r| query.matches(r))
            .map(|r| {
                let columns = helpfulness
                    .get(&(kind, r.id))
                    .filter(|_| kind.schema().tracks_helpfulness);
                ListedReview {
                    review: r.clone(),
                    helpful_count: columns.map_or(0, |c| c.helpful_count),
                    not_helpful_count: columns.map_or(0, |c| c.not_helpful_count),
                    wilson_score: columns.map_or(0.0, |c| c.wilson_score),
                }
            })
            .collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let page = matching.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn record_report(&self, report: &AbuseReport) -> Result<bool, ReviewError> {
        let key = (report.kind, report.review_id, report.reporter_id);
        let mut reports = self.reports.write().await;
        if reports.contains_key(&key) {
            return Ok(false);
        }
        reports.insert(key, report.clone());
        Ok(true)
    }
}

/// In-memory targets with their denormalized rating summary.
#[derive(Debug, Default)]
pub struct InMemoryTargetStore {
    targets: RwLock<HashMap<TargetRef, TargetRecord>>,
    summaries: RwLock<HashMap<TargetRef, (f64, u64)>>,
}

impl InMemoryTargetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a target.
    pub async fn insert(&self, record: TargetRecord) {
        self.targets
            .write()
            .await
            .insert(record.target.clone(), record);
    }

    /// Last `(average_rating, total_reviews)` written for a target.
    pub async fn summary(&self, target: &TargetRef) -> Option<(f64, u64)> {
        self.summaries.read().await.get(target).copied()
    }
}

#[async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn load(&self, target: &TargetRef) -> Result<Option<TargetRecord>, ReviewError> {
        Ok(self.targets.read().await.get(target).cloned())
    }

    async fn write_rating_summary(
        &self,
        target: &TargetRef,
        average: f64,
        total: u64,
    ) -> Result<(), ReviewError> {
        if !self.targets.read().await.contains_key(target) {
            return Err(ReviewError::NotFound(format!("target {target}")));
        }
        self.summaries
            .write()
            .await
            .insert(target.clone(), (average, total));
        Ok(())
    }
}

/// In-memory vote table keyed by the unique vote key.
#[derive(Debug, Default)]
pub struct InMemoryVoteStore {
    votes: RwLock<HashMap<VoteKey, VoteType>>,
}

impl InMemoryVoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored vote for a key.
    pub async fn get(&self, key: &VoteKey) -> Option<VoteType> {
        self.votes.read().await.get(key).copied()
    }
}

#[async_trait]
impl VoteStore for InMemoryVoteStore {
    async fn apply_vote(&self, key: VoteKey, vote: VoteType) -> Result<VoteChange, ReviewError> {
        let mut votes = self.votes.write().await;
        let change = VoteChange::decide(votes.get(&key).copied(), vote);
        if change == VoteChange::Removed {
            votes.remove(&key);
        } else {
            votes.insert(key, vote);
        }
        Ok(change)
    }

    async fn tally(&self, kind: ReviewKind, review_id: u64) -> Result<VoteTally, ReviewError> {
        let votes = self.votes.read().await;
        let mut tally = VoteTally::default();
        for (key, vote) in votes.iter() {
            if key.kind != kind || key.review_id != review_id {
                continue;
            }
            match vote {
                VoteType::Helpful => tally.helpful += 1,
                VoteType::NotHelpful => tally.not_helpful += 1,
            }
        }
        Ok(tally)
    }
}

/// In-memory webhook registrations.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    registrations: RwLock<HashMap<WebhookId, WebhookRegistration>>,
}

impl InMemoryWebhookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn insert(&self, registration: WebhookRegistration) -> Result<(), ReviewError> {
        self.registrations
            .write()
            .await
            .insert(registration.id, registration);
        Ok(())
    }

    async fn delete(&self, id: WebhookId) -> Result<bool, ReviewError> {
        Ok(self.registrations.write().await.remove(&id).is_some())
    }

    async fn list_active(&self) -> Result<Vec<WebhookRegistration>, ReviewError> {
        let registrations = self.registrations.read().await;
        let mut active: Vec<WebhookRegistration> =
            registrations.values().filter(|r| r.active).cloned().collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }
}

/// Process-local stats cache with tag invalidation and no expiry.
#[derive(Debug, Default)]
pub struct InMemoryStatsCache {
    entries: RwLock<HashMap<String, (TargetStats, Vec<String>)>>,
}

impl InMemoryStatsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StatsCache for InMemoryStatsCache {
    async fn get(&self, key: &str) -> Option<TargetStats> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|(stats, _)| stats.clone())
    }

    async fn set(&self, key: &str, stats: TargetStats, tags: &[String]) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (stats, tags.to_vec()));
    }

    async fn invalidate_tags(&self, tags: &[String]) {
        self.entries
            .write()
            .await
            .retain(|_, (_, entry_tags)| !entry_tags.iter().any(|t| tags.contains(t)));
    }
}

/// Lease used by [`InMemoryQueue::new`].
pub const DEFAULT_QUEUE_LEASE: Duration = Duration::from_secs(300);

/// FIFO queue held in process memory.
///
/// Claimed tasks are parked under their receipt until acknowledged. Once a
/// lease runs out the task goes back to the front of the queue.
#[derive(Debug)]
pub struct InMemoryQueue<T> {
    lease: Duration,
    state: Mutex<QueueState<T>>,
}

#[derive(Debug)]
struct QueueState<T> {
    next_receipt: u64,
    ready: VecDeque<(u64, T)>,
    leased: BTreeMap<u64, (T, Instant)>,
}

impl<T> QueueState<T> {
    fn requeue_expired(&mut self, now: Instant) {
        let (expired, live): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.leased)
            .into_iter()
            .partition(|(_, (_, until))| *until <= now);
        self.leased = live;
        for (receipt, (task, _)) in expired.into_iter().rev() {
            self.ready.push_front((receipt, task));
        }
    }
}

impl<T> InMemoryQueue<T> {
    /// Creates an empty queue with [`DEFAULT_QUEUE_LEASE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_lease(DEFAULT_QUEUE_LEASE)
    }

    /// Creates an empty queue whose claims expire after `lease`.
    #[must_use]
    pub fn with_lease(lease: Duration) -> Self {
        Self {
            lease,
            state: Mutex::new(QueueState {
                next_receipt: 1,
                ready: VecDeque::new(),
                leased: BTreeMap::new(),
            }),
        }
    }

    /// Number of stored tasks, claimed or not.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.leased.len()
    }

    /// Returns `true` if the queue stores no tasks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T> Default for InMemoryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> TaskQueue<T> for InMemoryQueue<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    async fn enqueue(&self, item: T) -> Result<(), ReviewError> {
        let mut state = self.state.lock().await;
        let receipt = state.next_receipt;
        state.next_receipt += 1;
        state.ready.push_back((receipt, item));
        Ok(())
    }

    async fn claim(&self) -> Result<Option<ClaimedTask<T>>, ReviewError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.requeue_expired(now);
        let Some((receipt, task)) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.leased.insert(receipt, (task.clone(), now + self.lease));
        Ok(Some(ClaimedTask { receipt, task }))
    }

    async fn ack(&self, receipt: u64) -> Result<(), ReviewError> {
        self.state.lock().await.leased.remove(&receipt);
        Ok(())
    }
}

/// In-memory user accounts.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<u64, UserAccount>>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user.
    pub async fn insert(&self, user: UserAccount) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn load_user(&self, id: u64) -> Result<Option<UserAccount>, ReviewError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
