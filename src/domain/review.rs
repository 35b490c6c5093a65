//! Normalized review record, moderation status and target reference.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::review_kind::{ReviewKind, TargetSpec};
use crate::error::ReviewError;

/// Moderation status shared by every review kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Awaiting moderation. Initial state of every review.
    Pending,
    /// Visible and counted in aggregate stats.
    Approved,
    /// Hidden by a moderator.
    Rejected,
    /// Reported for a second look.
    Flagged,
}

impl ReviewStatus {
    /// Returns the stored string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "flagged" => Ok(Self::Flagged),
            other => Err(ReviewError::Validation(format!(
                "unsupported moderation status: {other}"
            ))),
        }
    }
}

/// The entity a review is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct TargetRef {
    /// Target entity type (e.g. `"merchant_profile"`).
    pub target_type: String,
    /// Target entity id.
    pub target_id: u64,
}

impl TargetRef {
    /// Creates a target reference.
    #[must_use]
    pub fn new(target_type: impl Into<String>, target_id: u64) -> Self {
        Self {
            target_type: target_type.into(),
            target_id,
        }
    }

    /// Cache tag shared by every stats entry of this target.
    #[must_use]
    pub fn cache_tag(&self) -> String {
        format!("review_stats:{}:{}", self.target_type, self.target_id)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}

/// A review of any kind, with kind-specific columns already mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReviewRecord {
    /// Row id within the kind's table.
    pub id: u64,
    /// Review family.
    pub kind: ReviewKind,
    /// Star rating, 1–5 when present.
    pub rating: Option<u8>,
    /// Moderation status.
    pub status: ReviewStatus,
    /// Review text.
    pub body: String,
    /// Author user id.
    pub author_id: u64,
    /// Target type column value; empty for fixed-target kinds.
    pub target_type: String,
    /// Target id, `None` when the reference is missing.
    pub target_id: Option<u64>,
    /// Owning tenant, when the kind is tenant-scoped.
    pub tenant_id: Option<u64>,
    /// Response from the target's owner.
    pub owner_response: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ReviewRecord {
    /// Creates a pending review.
    #[must_use]
    pub fn new(
        id: u64,
        kind: ReviewKind,
        rating: Option<u8>,
        author_id: u64,
        target_type: impl Into<String>,
        target_id: Option<u64>,
    ) -> Self {
        Self {
            id,
            kind,
            rating,
            status: ReviewStatus::Pending,
            body: String::new(),
            author_id,
            target_type: target_type.into(),
            target_id,
            tenant_id: None,
            owner_response: None,
            created_at: Utc::now(),
        }
    }

    /// Resolves the review's target through the kind's schema.
    ///
    /// Returns `None` when the target id is missing or zero, or when a
    /// polymorphic kind has no target type recorded.
    #[must_use]
    pub fn target(&self) -> Option<TargetRef> {
        let target_id = self.target_id.filter(|id| *id > 0)?;
        let target_type = match self.kind.schema().target {
            TargetSpec::Fixed(target_type) => target_type.to_string(),
            TargetSpec::Polymorphic { .. } if self.target_type.is_empty() => return None,
            TargetSpec::Polymorphic { .. } => self.target_type.clone(),
        };
        Some(TargetRef::new(target_type, target_id))
    }

    /// Returns the rating only when it lies in 1–5.
    #[must_use]
    pub fn valid_rating(&self) -> Option<u8> {
        self.rating.filter(|r| (1..=5).contains(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ReviewStatus::Pending,
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
            ReviewStatus::Flagged,
        ] {
            assert!(matches!(status.as_str().parse::<ReviewStatus>(), Ok(s) if s == status));
        }
    }

    #[test]
    fn unknown_status_is_validation_error() {
        let result = "archived".parse::<ReviewStatus>();
        assert!(matches!(result, Err(ReviewError::Validation(_))));
    }

    #[test]
    fn fixed_kind_target_ignores_type_column() {
        let review = ReviewRecord::new(1, ReviewKind::Mentoring, Some(5), 9, "", Some(5));
        assert_eq!(review.target(), Some(TargetRef::new("mentoring_session", 5)));
    }

    #[test]
    fn polymorphic_kind_uses_type_column() {
        let review = ReviewRecord::new(1, ReviewKind::Commerce, Some(4), 9, "merchant_profile", Some(10));
        assert_eq!(review.target(), Some(TargetRef::new("merchant_profile", 10)));
    }

    #[test]
    fn polymorphic_kind_without_type_has_no_target() {
        let review = ReviewRecord::new(1, ReviewKind::Agro, Some(4), 9, "", Some(10));
        assert_eq!(review.target(), None);
    }

    #[test]
    fn missing_or_zero_target_id_has_no_target() {
        let missing = ReviewRecord::new(1, ReviewKind::Course, Some(4), 9, "", None);
        let zero = ReviewRecord::new(2, ReviewKind::Course, Some(4), 9, "", Some(0));
        assert_eq!(missing.target(), None);
        assert_eq!(zero.target(), None);
    }

    #[test]
    fn cache_tag_format() {
        let target = TargetRef::new("merchant_profile", 42);
        assert_eq!(target.cache_tag(), "review_stats:merchant_profile:42");
    }

    #[test]
    fn out_of_range_rating_is_not_valid() {
        let mut review = ReviewRecord::new(1, ReviewKind::Course, Some(6), 9, "", Some(1));
        assert_eq!(review.valid_rating(), None);
        review.rating = Some(0);
        assert_eq!(review.valid_rating(), None);
        review.rating = Some(3);
        assert_eq!(review.valid_rating(), Some(3));
    }
}
