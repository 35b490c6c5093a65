//! Public listing of approved reviews: filters, sort orders and pages.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::review::{ReviewRecord, TargetRef};
use crate::error::ReviewError;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Largest accepted page size; bigger requests are clamped.
pub const MAX_PAGE_SIZE: u64 = 50;

/// Sort order of a review listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    /// Highest Wilson score first, then most helpful votes. Kinds without
    /// helpfulness columns fall back to newest first.
    Helpful,
    /// Highest rating first.
    Highest,
    /// Lowest rating first.
    Lowest,
    /// Oldest first.
    Oldest,
    /// Newest first.
    #[default]
    Newest,
}

impl ReviewSort {
    /// Returns the query-string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Highest => "highest",
            Self::Lowest => "lowest",
            Self::Oldest => "oldest",
            Self::Newest => "newest",
        }
    }

    /// Orders two listed reviews. Ties break on id so pages are stable.
    #[must_use]
    pub fn compare(&self, a: &ListedReview, b: &ListedReview) -> Ordering {
        let newest = || {
            b.review
                .created_at
                .cmp(&a.review.created_at)
                .then_with(|| b.review.id.cmp(&a.review.id))
        };
        match self {
            Self::Helpful => b
                .wilson_score
                .total_cmp(&a.wilson_score)
                .then_with(|| b.helpful_count.cmp(&a.helpful_count))
                .then_with(newest),
            Self::Highest => b
                .review
                .rating
                .cmp(&a.review.rating)
                .then_with(newest),
            Self::Lowest => a
                .review
                .rating
                .cmp(&b.review.rating)
                .then_with(newest),
            Self::Oldest => a
                .review
                .created_at
                .cmp(&b.review.created_at)
                .then_with(|| a.review.id.cmp(&b.review.id)),
            Self::Newest => newest(),
        }
    }
}

impl fmt::Display for ReviewSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewSort {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helpful" => Ok(Self::Helpful),
            "highest" => Ok(Self::Highest),
            "lowest" => Ok(Self::Lowest),
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            other => Err(ReviewError::Validation(format!("unsupported sort: {other}"))),
        }
    }
}

/// Validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewListQuery {
    /// Only reviews about this target, when set.
    pub target: Option<TargetRef>,
    /// Only reviews with this star rating, when set.
    pub stars: Option<u8>,
    /// Sort order.
    pub sort: ReviewSort,
    /// Zero-based page number.
    pub page: u64,
    /// Page size, 1 to [`MAX_PAGE_SIZE`].
    pub limit: u64,
}

impl ReviewListQuery {
    /// Builds a query, clamping `limit` into 1..=[`MAX_PAGE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] if `stars` is outside 1–5.
    pub fn new(
        target: Option<TargetRef>,
        stars: Option<u8>,
        sort: ReviewSort,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Self, ReviewError> {
        if let Some(stars) = stars.filter(|s| !(1..=5).contains(s)) {
            return Err(ReviewError::Validation(format!(
                "stars must be between 1 and 5, got {stars}"
            )));
        }
        Ok(Self {
            target,
            stars,
            sort,
            page: page.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        })
    }

    /// Number of rows skipped before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }

    /// Returns `true` when `review` passes the target and star filters.
    ///
    /// Only the status is left to the caller.
    #[must_use]
    pub fn matches(&self, review: &ReviewRecord) -> bool {
        let target_ok = self
            .target
            .as_ref()
            .is_none_or(|target| review.target().as_ref() == Some(target));
        let stars_ok = self.stars.is_none_or(|stars| review.rating == Some(stars));
        target_ok && stars_ok
    }
}

/// An approved review with its helpfulness columns.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ListedReview {
    /// The review itself.
    #[serde(flatten)]
    pub review: ReviewRecord,
    /// `helpful` votes, `0` for kinds without helpfulness columns.
    pub helpful_count: u64,
    /// `not_helpful` votes.
    pub not_helpful_count: u64,
    /// Stored Wilson lower bound.
    pub wilson_score: f64,
}

/// One page of a review listing.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReviewPage {
    /// Reviews on this page.
    pub data: Vec<ListedReview>,
    /// Matching reviews across all pages.
    pub total: u64,
    /// Zero-based page number.
    pub page: u64,
    /// Page size.
    pub limit: u64,
    /// Number of pages.
    pub pages: u64,
    /// Approved reviews per star value for the target, ignoring the star
    /// filter. Empty when no target was given.
    pub star_counts: BTreeMap<u8, u64>,
}

impl ReviewPage {
    /// Assembles a page, deriving `pages` from `total` and the page size.
    #[must_use]
    pub fn new(
        query: &ReviewListQuery,
        data: Vec<ListedReview>,
        total: u64,
        star_counts: BTreeMap<u8, u64>,
    ) -> Self {
        Self {
            data,
            total,
            page: query.page,
            limit: query.limit,
            pages: total.div_ceil(query.limit),
            star_counts,
        }
    }
}
