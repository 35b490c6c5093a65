//! Rating aggregation with tag-invalidated caching.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{ReviewKind, ReviewListQuery, ReviewPage, ReviewRecord, TargetRef, TargetStats};
use crate::error::ReviewError;
use crate::persistence::{ReviewStore, StatsCache, TargetStore};

/// Cache key of the stats of `kind` reviews about `target`.
#[must_use]
pub fn stats_cache_key(kind: ReviewKind, target: &TargetRef) -> String {
    format!(
        "review_stats:{}:{}:{}",
        kind.as_str(),
        target.target_type,
        target.target_id
    )
}

/// Computes per-target rating statistics from approved reviews.
///
/// Results are cached without expiry and tagged by target, so one
/// invalidation drops the stats of every kind for that target.
#[derive(Debug, Clone)]
pub struct AggregationService {
    reviews: Arc<dyn ReviewStore>,
    targets: Arc<dyn TargetStore>,
    cache: Arc<dyn StatsCache>,
}

impl AggregationService {
    /// Creates a new `AggregationService`.
    #[must_use]
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        targets: Arc<dyn TargetStore>,
        cache: Arc<dyn StatsCache>,
    ) -> Self {
        Self {
            reviews,
            targets,
            cache,
        }
    }

    /// Returns the stats of `kind` reviews about `target`.
    ///
    /// Never fails: a store error is logged and answered with empty stats,
    /// which are not cached.
    pub async fn get_stats(&self, kind: ReviewKind, target: &TargetRef) -> TargetStats {
        let key = stats_cache_key(kind, target);
        if let Some(stats) = self.cache.get(&key).await {
            return stats;
        }

        match self.reviews.approved_ratings(kind, target).await {
            Ok(ratings) => {
                let stats = TargetStats::from_ratings(kind, target, ratings);
                self.cache.set(&key, stats.clone(), &[target.cache_tag()]).await;
                stats
            }
            Err(e) => {
                tracing::error!(kind = %kind, target = %target, error = %e, "stats query failed");
                TargetStats::empty(kind, target)
            }
        }
    }

    /// Returns one page of approved `kind` reviews.
    ///
    /// When the query names a target, the page carries that target's star
    /// distribution from the cached stats.
    ///
    /// # Errors
    ///
    /// Propagates store failures of the listing query.
    pub async fn list_reviews(
        &self,
        kind: ReviewKind,
        query: &ReviewListQuery,
    ) -> Result<ReviewPage, ReviewError> {
        let (data, total) = self.reviews.list_approved(kind, query).await?;
        let star_counts = match &query.target {
            Some(target) => self.get_stats(kind, target).await.distribution,
            None => BTreeMap::new(),
        };
        Ok(ReviewPage::new(query, data, total, star_counts))
    }

    /// Drops the cached stats of every kind for `target`.
    pub async fn invalidate(&self, target: &TargetRef) {
        self.cache.invalidate_tags(&[target.cache_tag()]).await;
    }

    /// Refreshes the stats of the target `review` belongs to.
    ///
    /// Returns `None` when the review has no resolvable target. When the
    /// target type carries rating columns, the fresh average and count are
    /// written back; a failed write is logged and ignored.
    pub async fn recalculate_for_review(&self, review: &ReviewRecord) -> Option<TargetStats> {
        let target = review.target()?;

        self.invalidate(&target).await;
        let stats = self.get_stats(review.kind, &target).await;

        match self.targets.load(&target).await {
            Ok(Some(record)) if record.supports_rating_denormalization => {
                if let Err(e) = self
                    .targets
                    .write_rating_summary(&target, stats.average, stats.count)
                    .await
                {
                    tracing::warn!(target = %target, error = %e, "rating denormalization failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "target lookup failed");
            }
        }

        tracing::debug!(
            kind = %review.kind,
            review_id = review.id,
            target = %target,
            average = stats.average,
            count = stats.count,
            "target stats recalculated"
        );
        Some(stats)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ReviewSort, ReviewStatus};
    use crate::persistence::memory::{InMemoryReviewStore, InMemoryStatsCache, InMemoryTargetStore};
    use crate::persistence::models::TargetRecord;

    struct Fixture {
        reviews: Arc<InMemoryReviewStore>,
        targets: Arc<InMemoryTargetStore>,
        cache: Arc<InMemoryStatsCache>,
        service: AggregationService,
    }

    fn fixture() -> Fixture {
        let reviews = Arc::new(InMemoryReviewStore::new());
        let targets = Arc::new(InMemoryTargetStore::new());
        let cache = Arc::new(InMemoryStatsCache::new());
        let service = AggregationService::new(
            Arc::clone(&reviews) as Arc<dyn ReviewStore>,
            Arc::clone(&targets) as Arc<dyn TargetStore>,
            Arc::clone(&cache) as Arc<dyn StatsCache>,
        );
        Fixture {
            reviews,
            targets,
            cache,
            service,
        }
    }

    async fn seed(reviews: &InMemoryReviewStore, id: u64, rating: u8, status: ReviewStatus) {
        let mut review = ReviewRecord::new(
            id,
            ReviewKind::Agro,
            Some(rating),
            100 + id,
            "producer_profile",
            Some(20),
        );
        review.status = status;
        reviews.insert(review).await;
    }

    #[test]
    fn cache_key_format() {
        let target = TargetRef::new("producer_profile", 20);
        assert_eq!(
            stats_cache_key(ReviewKind::Agro, &target),
            "review_stats:agro:producer_profile:20"
        );
    }

    #[tokio::test]
    async fn aggregates_only_approved_ratings() {
        let f = fixture();
        for (id, rating) in [(1, 5), (2, 5), (3, 4), (4, 3)] {
            seed(&f.reviews, id, rating, ReviewStatus::Approved).await;
        }
        seed(&f.reviews, 5, 1, ReviewStatus::Rejected).await;

        let stats = f
            .service
            .get_stats(ReviewKind::Agro, &TargetRef::new("producer_profile", 20))
            .await;
        assert!((stats.average - 4.25).abs() < f64::EPSILON);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.distribution.get(&5), Some(&2));
        assert_eq!(stats.distribution.get(&4), Some(&1));
        assert_eq!(stats.distribution.get(&3), Some(&1));
        assert_eq!(stats.distribution.get(&1), Some(&0));
    }

    #[tokio::test]
    async fn unknown_target_yields_empty_stats() {
        let f = fixture();
        let stats = f
            .service
            .get_stats(ReviewKind::Commerce, &TargetRef::new("merchant_profile", 9))
            .await;
        assert_eq!(stats.count, 0);
        assert!(stats.average.abs() < f64::EPSILON);
        assert_eq!(stats.distribution.len(), 5);
    }

    #[tokio::test]
    async fn serves_cached_stats_until_invalidated() {
        let f = fixture();
        let target = TargetRef::new("producer_profile", 20);
        seed(&f.reviews, 1, 5, ReviewStatus::Approved).await;
        assert_eq!(f.service.get_stats(ReviewKind::Agro, &target).await.count, 1);

        seed(&f.reviews, 2, 3, ReviewStatus::Approved).await;
        assert_eq!(f.service.get_stats(ReviewKind::Agro, &target).await.count, 1);

        f.service.invalidate(&target).await;
        assert!(f.cache.is_empty().await);
        assert_eq!(f.service.get_stats(ReviewKind::Agro, &target).await.count, 2);
    }

    #[tokio::test]
    async fn recalculation_denormalizes_supported_targets() {
        let f = fixture();
        let target = TargetRef::new("producer_profile", 20);
        f.targets
            .insert(TargetRecord {
                target: target.clone(),
                owner_id: Some(7),
                supports_rating_denormalization: true,
            })
            .await;
        seed(&f.reviews, 1, 4, ReviewStatus::Approved).await;
        seed(&f.reviews, 2, 5, ReviewStatus::Approved).await;

        let Some(review) = f.reviews.load(ReviewKind::Agro, 1).await.ok().flatten() else {
            panic!("seeded review must load");
        };
        let stats = f.service.recalculate_for_review(&review).await;
        assert_eq!(stats.map(|s| s.count), Some(2));
        assert_eq!(f.targets.summary(&target).await, Some((4.5, 2)));
    }

    #[tokio::test]
    async fn listing_pages_and_counts_stars_for_the_target() {
        let f = fixture();
        for (id, rating) in [(1, 5), (2, 4), (3, 5)] {
            seed(&f.reviews, id, rating, ReviewStatus::Approved).await;
        }
        seed(&f.reviews, 4, 2, ReviewStatus::Pending).await;

        let target = TargetRef::new("producer_profile", 20);
        let Ok(query) =
            ReviewListQuery::new(Some(target), Some(5), ReviewSort::Oldest, None, Some(1))
        else {
            panic!("query must build");
        };
        let Ok(page) = f.service.list_reviews(ReviewKind::Agro, &query).await else {
            panic!("listing must succeed");
        };
        assert_eq!(page.total, 2);
        assert_eq!(page.pages, 2);
        assert_eq!(page.data.iter().map(|r| r.review.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(page.star_counts.get(&5), Some(&2));
        assert_eq!(page.star_counts.get(&4), Some(&1));
        assert_eq!(page.star_counts.get(&2), Some(&0));
    }

    #[tokio::test]
    async fn untargeted_listing_has_no_star_counts() {
        let f = fixture();
        seed(&f.reviews, 1, 3, ReviewStatus::Approved).await;
        let Ok(query) = ReviewListQuery::new(None, None, ReviewSort::Newest, None, None) else {
            panic!("query must build");
        };
        let Ok(page) = f.service.list_reviews(ReviewKind::Agro, &query).await else {
            panic!("listing must succeed");
        };
        assert_eq!(page.total, 1);
        assert!(page.star_counts.is_empty());
    }

    #[tokio::test]
    async fn recalculation_without_target_is_a_no_op() {
        let f = fixture();
        let review = ReviewRecord::new(1, ReviewKind::Agro, Some(5), 3, "", None);
        assert!(f.service.recalculate_for_review(&review).await.is_none());
    }
}
