//! Moderation state machine and review lifecycle hooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{
    AbuseReason, AbuseReport, EventBus, LifecycleEvent, ReviewEvent, ReviewKind, ReviewRecord,
    ReviewStatus,
};
use crate::error::ReviewError;
use crate::persistence::{ReviewStore, TargetStore};
use crate::service::AggregationService;

/// Applies moderation decisions and publishes lifecycle events.
///
/// Every state change follows the same pattern: persist the status, run
/// the recalculation hook when approved-set membership may have changed,
/// then publish the matching [`LifecycleEvent`] on the [`EventBus`].
#[derive(Debug, Clone)]
pub struct ModerationService {
    reviews: Arc<dyn ReviewStore>,
    targets: Arc<dyn TargetStore>,
    aggregation: Arc<AggregationService>,
    event_bus: EventBus,
}

impl ModerationService {
    /// Creates a new `ModerationService`.
    #[must_use]
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        targets: Arc<dyn TargetStore>,
        aggregation: Arc<AggregationService>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            reviews,
            targets,
            aggregation,
            event_bus,
        }
    }

    /// Moves a review to the status named by `new_status`.
    ///
    /// Returns `Ok(false)` when the review does not exist and `Ok(true)`
    /// otherwise, including when the status is already `new_status`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] for an unknown status name and
    /// propagates store failures of the lookup or the status write.
    pub async fn moderate(
        &self,
        kind: ReviewKind,
        id: u64,
        new_status: &str,
    ) -> Result<bool, ReviewError> {
        let status = new_status.parse::<ReviewStatus>()?;
        self.moderate_to(kind, id, status).await
    }

    /// Typed variant of [`Self::moderate`].
    ///
    /// # Errors
    ///
    /// Propagates store failures of the lookup or the status write.
    pub async fn moderate_to(
        &self,
        kind: ReviewKind,
        id: u64,
        new_status: ReviewStatus,
    ) -> Result<bool, ReviewError> {
        let Some(mut review) = self.reviews.load(kind, id).await? else {
            tracing::debug!(kind = %kind, review_id = id, "moderation target missing");
            return Ok(false);
        };

        let old_status = review.status;
        if old_status == new_status {
            return Ok(true);
        }

        self.reviews.update_status(kind, id, new_status).await?;
        review.status = new_status;

        // Approved-set membership changes when entering approved/rejected or
        // leaving approved.
        if matches!(new_status, ReviewStatus::Approved | ReviewStatus::Rejected)
            || old_status == ReviewStatus::Approved
        {
            self.aggregation.recalculate_for_review(&review).await;
        }

        if let Some(event) = status_event(new_status) {
            let _ = self.event_bus.publish(
                LifecycleEvent::new(event, review)
                    .with_extra("previous_status", old_status.as_str()),
            );
        }

        tracing::info!(
            kind = %kind,
            review_id = id,
            from = %old_status,
            to = %new_status,
            "review moderated"
        );
        Ok(true)
    }

    /// Reviews awaiting moderation, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_pending_reviews(
        &self,
        kind: ReviewKind,
        tenant_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, ReviewError> {
        self.reviews
            .list_by_status(kind, ReviewStatus::Pending, tenant_id, limit)
            .await
    }

    /// Pending review counts per kind. Kinds with no pending reviews are
    /// omitted.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_pending_counts(
        &self,
        tenant_id: Option<u64>,
    ) -> Result<BTreeMap<ReviewKind, u64>, ReviewError> {
        let mut counts = BTreeMap::new();
        for kind in ReviewKind::ALL {
            let count = self
                .reviews
                .count_by_status(kind, ReviewStatus::Pending, tenant_id)
                .await?;
            if count > 0 {
                counts.insert(kind, count);
            }
        }
        Ok(counts)
    }

    /// Flags a review for re-moderation and records the reason.
    ///
    /// # Errors
    ///
    /// Same as [`Self::moderate_to`].
    pub async fn flag_review(
        &self,
        kind: ReviewKind,
        id: u64,
        reason: &str,
    ) -> Result<bool, ReviewError> {
        let flagged = self.moderate_to(kind, id, ReviewStatus::Flagged).await?;
        if flagged {
            tracing::warn!(kind = %kind, review_id = id, reason, "review flagged");
        }
        Ok(flagged)
    }

    /// Records a user's abuse report and flags the review.
    ///
    /// Each user may report a given review once.
    ///
    /// # Errors
    ///
    /// - [`ReviewError::NotFound`] if the review does not exist.
    /// - [`ReviewError::Conflict`] if `reporter_id` already reported it.
    /// - Store failures of the lookup, the report insert or the flag.
    pub async fn report_abuse(
        &self,
        kind: ReviewKind,
        id: u64,
        reporter_id: u64,
        reason: AbuseReason,
        details: &str,
    ) -> Result<ReviewRecord, ReviewError> {
        let mut review = self
            .reviews
            .load(kind, id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("review {kind}/{id}")))?;

        let report = AbuseReport::new(kind, id, reporter_id, reason, details);
        if !self.reviews.record_report(&report).await? {
            return Err(ReviewError::Conflict(format!(
                "user {reporter_id} already reported review {kind}/{id}"
            )));
        }

        self.flag_review(kind, id, reason.as_str()).await?;
        review.status = ReviewStatus::Flagged;
        Ok(review)
    }

    /// Hook for newly submitted reviews.
    pub fn on_review_created(&self, review: &ReviewRecord) {
        let _ = self
            .event_bus
            .publish(LifecycleEvent::new(ReviewEvent::Created, review.clone()));
        tracing::debug!(kind = %review.kind, review_id = review.id, "review created");
    }

    /// Hook for deleted reviews: refreshes the target's stats as if the
    /// review had been rejected.
    pub async fn on_review_deleted(&self, review: &ReviewRecord) {
        self.aggregation.recalculate_for_review(review).await;
        let _ = self
            .event_bus
            .publish(LifecycleEvent::new(ReviewEvent::Deleted, review.clone()));
        tracing::info!(kind = %review.kind, review_id = review.id, "review deleted");
    }

    /// Stores the target owner's public response to a review.
    ///
    /// # Errors
    ///
    /// - [`ReviewError::Validation`] if the kind takes no responses or the
    ///   text is blank.
    /// - [`ReviewError::NotFound`] if the review does not exist.
    /// - [`ReviewError::Forbidden`] if `responder_id` does not own the
    ///   review's target.
    pub async fn respond(
        &self,
        kind: ReviewKind,
        id: u64,
        responder_id: u64,
        text: &str,
    ) -> Result<ReviewRecord, ReviewError> {
        if kind.schema().response_field.is_none() {
            return Err(ReviewError::Validation(format!(
                "{kind} reviews do not accept responses"
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ReviewError::Validation("response text is empty".to_string()));
        }

        let mut review = self
            .reviews
            .load(kind, id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("review {kind}/{id}")))?;

        let owner_id = match review.target() {
            Some(target) => self.targets.load(&target).await?.and_then(|t| t.owner_id),
            None => None,
        };
        if owner_id != Some(responder_id) {
            return Err(ReviewError::Forbidden(format!(
                "user {responder_id} does not own the target of review {kind}/{id}"
            )));
        }

        self.reviews.set_owner_response(kind, id, text).await?;
        review.owner_response = Some(text.to_string());

        let _ = self.event_bus.publish(
            LifecycleEvent::new(ReviewEvent::Responded, review.clone())
                .with_extra("response", text),
        );
        tracing::info!(kind = %kind, review_id = id, responder_id, "owner responded");
        Ok(review)
    }
}

/// Lifecycle event published when a review enters `status`.
const fn status_event(status: ReviewStatus) -> Option<ReviewEvent> {
    match status {
        ReviewStatus::Approved => Some(ReviewEvent::Approved),
        ReviewStatus::Rejected => Some(ReviewEvent::Rejected),
        ReviewStatus::Flagged => Some(ReviewEvent::Flagged),
        ReviewStatus::Pending => None,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::TargetRef;
    use crate::persistence::StatsCache;
    use crate::persistence::memory::{InMemoryReviewStore, InMemoryStatsCache, InMemoryTargetStore};
    use crate::persistence::models::TargetRecord;

    struct Fixture {
        reviews: Arc<InMemoryReviewStore>,
        targets: Arc<InMemoryTargetStore>,
        aggregation: Arc<AggregationService>,
        event_bus: EventBus,
        service: ModerationService,
    }

    fn fixture() -> Fixture {
        let reviews = Arc::new(InMemoryReviewStore::new());
        let targets = Arc::new(InMemoryTargetStore::new());
        let cache: Arc<dyn StatsCache> = Arc::new(InMemoryStatsCache::new());
        let aggregation = Arc::new(AggregationService::new(
            Arc::clone(&reviews) as Arc<dyn ReviewStore>,
            Arc::clone(&targets) as Arc<dyn TargetStore>,
            cache,
        ));
        let event_bus = EventBus::new(64);
        let service = ModerationService::new(
            Arc::clone(&reviews) as Arc<dyn ReviewStore>,
            Arc::clone(&targets) as Arc<dyn TargetStore>,
            Arc::clone(&aggregation),
            event_bus.clone(),
        );
        Fixture {
            reviews,
            targets,
            aggregation,
            event_bus,
            service,
        }
    }

    async fn seed_target(targets: &InMemoryTargetStore) -> TargetRef {
        let target = TargetRef::new("provider_profile", 30);
        targets
            .insert(TargetRecord {
                target: target.clone(),
                owner_id: Some(77),
                supports_rating_denormalization: true,
            })
            .await;
        target
    }

    async fn seed_review(reviews: &InMemoryReviewStore, id: u64, rating: u8) {
        reviews
            .insert(ReviewRecord::new(
                id,
                ReviewKind::Services,
                Some(rating),
                500 + id,
                "",
                Some(30),
            ))
            .await;
    }

    #[tokio::test]
    async fn report_flags_review_and_refuses_repeats() {
        let f = fixture();
        let target = seed_target(&f.targets).await;
        seed_review(&f.reviews, 1, 5).await;
        assert!(f.service.moderate(ReviewKind::Services, 1, "approved").await.is_ok());
        assert_eq!(f.targets.summary(&target).await, Some((5.0, 1)));

        let Ok(review) = f
            .service
            .report_abuse(ReviewKind::Services, 1, 9, AbuseReason::Spam, " link farm ")
            .await
        else {
            panic!("first report must be accepted");
        };
        assert_eq!(review.status, ReviewStatus::Flagged);
        assert_eq!(f.targets.summary(&target).await, Some((0.0, 0)));

        let reports = f.reviews.reports(ReviewKind::Services, 1).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports.first().map(|r| r.details.as_str()), Some("link farm"));

        assert!(matches!(
            f.service
                .report_abuse(ReviewKind::Services, 1, 9, AbuseReason::Fake, "")
                .await,
            Err(ReviewError::Conflict(_))
        ));
        assert!(
            f.service
                .report_abuse(ReviewKind::Services, 1, 10, AbuseReason::Other, "")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn reporting_missing_review_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service
                .report_abuse(ReviewKind::Agro, 404, 9, AbuseReason::Spam, "")
                .await,
            Err(ReviewError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn approval_recalculates_target_once() {
        let f = fixture();
        let target = seed_target(&f.targets).await;
        seed_review(&f.reviews, 1, 4).await;
        let mut rx = f.event_bus.subscribe();

        assert!(matches!(
            f.service.moderate(ReviewKind::Services, 1, "approved").await,
            Ok(true)
        ));
        assert_eq!(f.targets.summary(&target).await, Some((4.0, 1)));

        // A second recalculation would pick up this approved review.
        seed_review(&f.reviews, 2, 2).await;
        let Ok(Some(mut second)) = f.reviews.load(ReviewKind::Services, 2).await else {
            panic!("seeded review must load");
        };
        second.status = ReviewStatus::Approved;
        f.reviews.insert(second).await;

        assert!(matches!(
            f.service.moderate(ReviewKind::Services, 1, "approved").await,
            Ok(true)
        ));
        assert_eq!(f.targets.summary(&target).await, Some((4.0, 1)));

        let Ok(event) = rx.try_recv() else {
            panic!("approval must publish an event");
        };
        assert_eq!(event.event, ReviewEvent::Approved);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_review_is_benign() {
        let f = fixture();
        assert!(matches!(
            f.service.moderate(ReviewKind::Course, 404, "rejected").await,
            Ok(false)
        ));
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let f = fixture();
        seed_review(&f.reviews, 1, 5).await;
        assert!(matches!(
            f.service.moderate(ReviewKind::Services, 1, "archived").await,
            Err(ReviewError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn rejecting_approved_review_removes_it_from_stats() {
        let f = fixture();
        let target = seed_target(&f.targets).await;
        seed_review(&f.reviews, 1, 5).await;
        seed_review(&f.reviews, 2, 3).await;

        for id in [1, 2] {
            let _ = f
                .service
                .moderate_to(ReviewKind::Services, id, ReviewStatus::Approved)
                .await;
        }
        assert_eq!(f.targets.summary(&target).await, Some((4.0, 2)));

        let _ = f
            .service
            .moderate_to(ReviewKind::Services, 1, ReviewStatus::Rejected)
            .await;
        assert_eq!(f.targets.summary(&target).await, Some((3.0, 1)));
    }

    #[tokio::test]
    async fn flagging_pending_review_skips_recalculation() {
        let f = fixture();
        let target = seed_target(&f.targets).await;
        seed_review(&f.reviews, 1, 5).await;

        let Ok(flagged) = f.service.flag_review(ReviewKind::Services, 1, "spam").await else {
            panic!("flagging must succeed");
        };
        assert!(flagged);
        assert_eq!(f.targets.summary(&target).await, None);
        let Ok(Some(review)) = f.reviews.load(ReviewKind::Services, 1).await else {
            panic!("review must exist");
        };
        assert_eq!(review.status, ReviewStatus::Flagged);
    }

    #[tokio::test]
    async fn pending_counts_omit_empty_kinds() {
        let f = fixture();
        seed_review(&f.reviews, 1, 5).await;
        seed_review(&f.reviews, 2, 4).await;

        let Ok(counts) = f.service.get_pending_counts(None).await else {
            panic!("counts must load");
        };
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get(&ReviewKind::Services), Some(&2));
    }

    #[tokio::test]
    async fn only_target_owner_may_respond() {
        let f = fixture();
        seed_target(&f.targets).await;
        seed_review(&f.reviews, 1, 5).await;

        assert!(matches!(
            f.service.respond(ReviewKind::Services, 1, 12, "Thanks!").await,
            Err(ReviewError::Forbidden(_))
        ));

        let Ok(review) = f.service.respond(ReviewKind::Services, 1, 77, "Thanks!").await else {
            panic!("owner must be able to respond");
        };
        assert_eq!(review.owner_response.as_deref(), Some("Thanks!"));
    }

    #[tokio::test]
    async fn mentoring_reviews_reject_responses() {
        let f = fixture();
        assert!(matches!(
            f.service.respond(ReviewKind::Mentoring, 1, 1, "hi").await,
            Err(ReviewError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn deletion_publishes_event() {
        let f = fixture();
        let mut rx = f.event_bus.subscribe();
        let review = ReviewRecord::new(9, ReviewKind::Course, Some(2), 1, "", Some(4));
        f.service.on_review_deleted(&review).await;

        let Ok(event) = rx.try_recv() else {
            panic!("deletion must publish an event");
        };
        assert_eq!(event.event, ReviewEvent::Deleted);
        assert_eq!(event.review.id, 9);
    }

    #[tokio::test]
    async fn deleting_approved_review_drops_it_from_stats() {
        let f = fixture();
        let target = seed_target(&f.targets).await;
        seed_review(&f.reviews, 1, 5).await;
        seed_review(&f.reviews, 2, 3).await;
        for id in [1, 2] {
            let _ = f
                .service
                .moderate_to(ReviewKind::Services, id, ReviewStatus::Approved)
                .await;
        }
        assert_eq!(f.targets.summary(&target).await, Some((4.0, 2)));
        assert_eq!(f.aggregation.get_stats(ReviewKind::Services, &target).await.count, 2);

        let Some(deleted) = f.reviews.remove(ReviewKind::Services, 1).await else {
            panic!("seeded review must exist");
        };
        f.service.on_review_deleted(&deleted).await;

        assert_eq!(f.targets.summary(&target).await, Some((3.0, 1)));
        let stats = f.aggregation.get_stats(ReviewKind::Services, &target).await;
        assert_eq!(stats.count, 1);
        assert_eq!(stats.distribution.get(&5), Some(&0));
    }

    #[tokio::test]
    async fn creation_publishes_event_without_recalculating() {
        let f = fixture();
        let target = seed_target(&f.targets).await;
        seed_review(&f.reviews, 3, 4).await;
        let Ok(Some(created)) = f.reviews.load(ReviewKind::Services, 3).await else {
            panic!("seeded review must load");
        };
        let mut rx = f.event_bus.subscribe();

        f.service.on_review_created(&created);

        let Ok(event) = rx.try_recv() else {
            panic!("creation must publish an event");
        };
        assert_eq!(event.event, ReviewEvent::Created);
        assert_eq!(event.review.id, 3);
        assert_eq!(f.targets.summary(&target).await, None);
    }
}
