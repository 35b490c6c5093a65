//! Storage-side models and row conversions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ListedReview, ReviewKind, ReviewRecord, ReviewStatus, TargetRef};
use crate::error::ReviewError;

/// A target entity as seen by the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Target reference.
    pub target: TargetRef,
    /// User who owns the target (merchant, producer, instructor...).
    pub owner_id: Option<u64>,
    /// Whether `average_rating` / `total_reviews` may be written back.
    pub supports_rating_denormalization: bool,
}

/// A review row with kind-specific columns aliased to common names.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    /// Row id.
    pub id: i64,
    /// Rating column.
    pub rating: Option<i32>,
    /// Status column.
    pub status: String,
    /// Body column.
    pub body: Option<String>,
    /// Author user id.
    pub author_id: i64,
    /// Target id column.
    pub target_id: Option<i64>,
    /// Target type column, empty for fixed-target kinds.
    pub target_type: Option<String>,
    /// Tenant id.
    pub tenant_id: Option<i64>,
    /// Owner response column.
    pub owner_response: Option<String>,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl ReviewRow {
    /// Converts the row into a [`ReviewRecord`] of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] if the stored status is not one
    /// of the four moderation states.
    pub fn into_record(self, kind: ReviewKind) -> Result<ReviewRecord, ReviewError> {
        Ok(ReviewRecord {
            id: to_u64(self.id),
            kind,
            rating: self.rating.and_then(|r| u8::try_from(r).ok()),
            status: self.status.parse::<ReviewStatus>()?,
            body: self.body.unwrap_or_default(),
            author_id: to_u64(self.author_id),
            target_type: self.target_type.unwrap_or_default(),
            target_id: self.target_id.map(to_u64),
            tenant_id: self.tenant_id.map(to_u64),
            owner_response: self.owner_response,
            created_at: self.created,
        })
    }
}

/// A listed review row: [`ReviewRow`] plus the helpfulness columns.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListedRow {
    /// Common review columns.
    #[sqlx(flatten)]
    pub review: ReviewRow,
    /// `helpful_count` column, `0` for kinds without it.
    pub helpful_count: i64,
    /// `not_helpful_count` column.
    pub not_helpful_count: i64,
    /// `wilson_score` column.
    pub wilson_score: f64,
}

impl ListedRow {
    /// Converts the row into a [`ListedReview`] of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] if the stored status is unknown.
    pub fn into_listed(self, kind: ReviewKind) -> Result<ListedReview, ReviewError> {
        Ok(ListedReview {
            review: self.review.into_record(kind)?,
            helpful_count: to_u64(self.helpful_count),
            not_helpful_count: to_u64(self.not_helpful_count),
            wilson_score: self.wilson_score,
        })
    }
}

/// Converts a database `BIGINT` id to `u64`, clamping negatives to 0.
#[must_use]
pub fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Converts a `u64` id to a database `BIGINT`, saturating at `i64::MAX`.
#[must_use]
pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
