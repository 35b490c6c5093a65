//! Aggregate rating statistics for one (kind, target) pair.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::review::TargetRef;
use super::review_kind::ReviewKind;

/// Derived rating summary. Always recomputed from approved reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TargetStats {
    /// Target type.
    pub target_type: String,
    /// Target id.
    pub target_id: u64,
    /// Review family the stats were computed from.
    pub review_kind: ReviewKind,
    /// Mean rating rounded to 2 decimals, `0.0` when there are no reviews.
    pub average: f64,
    /// Number of approved, in-range ratings.
    pub count: u64,
    /// Count per star value, keys 1 through 5 always present.
    pub distribution: BTreeMap<u8, u64>,
}

impl TargetStats {
    /// Stats for a target with no approved reviews.
    #[must_use]
    pub fn empty(kind: ReviewKind, target: &TargetRef) -> Self {
        Self {
            target_type: target.target_type.clone(),
            target_id: target.target_id,
            review_kind: kind,
            average: 0.0,
            count: 0,
            distribution: (1..=5).map(|star| (star, 0)).collect(),
        }
    }

    /// Folds raw ratings into stats. Values outside 1–5 are ignored.
    #[must_use]
    pub fn from_ratings<I>(kind: ReviewKind, target: &TargetRef, ratings: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut stats = Self::empty(kind, target);
        let mut sum: u64 = 0;
        for rating in ratings {
            let Ok(star) = u8::try_from(rating) else {
                continue;
            };
            if let Some(bucket) = stats.distribution.get_mut(&star) {
                *bucket += 1;
                sum += u64::from(star);
                stats.count += 1;
            }
        }
        if stats.count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let mean = sum as f64 / stats.count as f64;
            stats.average = round2(mean);
        }
        stats
    }
}

/// Rounds half away from zero to 2 decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetRef {
        TargetRef::new("merchant_profile", 1)
    }

    #[test]
    fn empty_has_all_buckets() {
        let stats = TargetStats::empty(ReviewKind::Commerce, &target());
        assert_eq!(stats.count, 0);
        assert!((stats.average - 0.0).abs() < f64::EPSILON);
        assert_eq!(stats.distribution.len(), 5);
        assert!(stats.distribution.values().all(|c| *c == 0));
    }

    #[test]
    fn folds_ratings() {
        let stats = TargetStats::from_ratings(ReviewKind::Commerce, &target(), [5, 5, 4, 3]);
        assert!((stats.average - 4.25).abs() < f64::EPSILON);
        assert_eq!(stats.count, 4);
        let expected: BTreeMap<u8, u64> = [(1, 0), (2, 0), (3, 1), (4, 1), (5, 2)].into();
        assert_eq!(stats.distribution, expected);
    }

    #[test]
    fn ignores_out_of_range_ratings() {
        let stats = TargetStats::from_ratings(ReviewKind::Commerce, &target(), [0, 5, -1, 6, 3]);
        assert!((stats.average - 4.0).abs() < f64::EPSILON);
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        let stats = TargetStats::from_ratings(ReviewKind::Course, &target(), [5, 4, 4]);
        assert!((stats.average - 4.33).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_distribution_with_star_keys() {
        let stats = TargetStats::from_ratings(ReviewKind::Agro, &target(), [2]);
        let json = serde_json::to_value(&stats).unwrap_or_default();
        let distribution = json.get("distribution");
        assert_eq!(distribution.and_then(|d| d.get("2")), Some(&serde_json::json!(1)));
        assert_eq!(distribution.and_then(|d| d.get("5")), Some(&serde_json::json!(0)));
    }
}
