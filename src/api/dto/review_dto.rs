//! Request and response bodies of the per-review endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{AbuseReason, ReviewKind, ReviewListQuery, ReviewSort, ReviewStatus, TargetRef};
use crate::error::ReviewError;

/// Query of `GET /reviews/{kind}/list`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Only reviews about this target id.
    pub target_id: Option<u64>,
    /// Target type. Required with `target_id` for polymorphic kinds;
    /// defaults to the kind's fixed type otherwise.
    pub target_type: Option<String>,
    /// Only reviews with this star rating (1–5).
    pub stars: Option<u8>,
    /// `helpful`, `highest`, `lowest`, `oldest` or `newest` (default).
    pub sort: Option<String>,
    /// Zero-based page number.
    pub page: Option<u64>,
    /// Page size (1–50). Defaults to 10.
    pub limit: Option<u64>,
}

impl ListQuery {
    /// Validates the parameters for a listing of `kind` reviews.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] for an unknown sort, stars
    /// outside 1–5, a target type without a target id, or a target id
    /// without a type on a polymorphic kind.
    pub fn into_domain(self, kind: ReviewKind) -> Result<ReviewListQuery, ReviewError> {
        let sort = match self.sort.as_deref() {
            Some(sort) => sort.parse::<ReviewSort>()?,
            None => ReviewSort::default(),
        };
        let fixed = kind.schema().fixed_target_type();
        let target = match (self.target_id, self.target_type) {
            (Some(id), Some(target_type)) => Some(TargetRef::new(target_type, id)),
            (Some(id), None) => match fixed {
                Some(target_type) => Some(TargetRef::new(target_type, id)),
                None => {
                    return Err(ReviewError::Validation(format!(
                        "{kind} reviews need target_type with target_id"
                    )));
                }
            },
            (None, Some(_)) => {
                return Err(ReviewError::Validation(
                    "target_type given without target_id".to_string(),
                ));
            }
            (None, None) => None,
        };
        ReviewListQuery::new(target, self.stars, sort, self.page, self.limit)
    }
}

/// Body of `POST /reviews/{kind}/{id}/vote`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VoteRequest {
    /// `true` for a helpful vote, `false` for not helpful.
    pub helpful: bool,
}

/// Body of `POST /reviews/{kind}/{id}/moderate`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModerateRequest {
    /// Target status: `pending`, `approved`, `rejected` or `flagged`.
    pub status: String,
}

/// Body of `POST /reviews/{kind}/{id}/flag`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct FlagRequest {
    /// Free-text reason recorded in the audit log.
    #[serde(default)]
    pub reason: String,
}

/// Body of `POST /reviews/{kind}/{id}/response`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RespondRequest {
    /// Response text shown under the review.
    pub text: String,
}

/// Body of `POST /reviews/{kind}/{id}/report`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReportRequest {
    /// `spam`, `offensive`, `fake` or `other` (default).
    #[serde(default)]
    pub reason: Option<String>,
    /// Free text for the moderators.
    #[serde(default)]
    pub details: String,
}

impl ReportRequest {
    /// Parses the reason, defaulting to [`AbuseReason::Other`].
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] for a reason outside the
    /// vocabulary.
    pub fn reason(&self) -> Result<AbuseReason, ReviewError> {
        self.reason
            .as_deref()
            .map_or(Ok(AbuseReason::default()), str::parse)
    }
}

/// Result of an accepted abuse report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportResponse {
    /// Review family.
    pub kind: ReviewKind,
    /// Review id.
    pub id: u64,
    /// Review status after the report.
    pub status: ReviewStatus,
    /// Recorded reason.
    pub reason: AbuseReason,
}

/// Result of a moderation or flag call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModerationResponse {
    /// Review family.
    pub kind: ReviewKind,
    /// Review id.
    pub id: u64,
    /// Status after the call.
    pub status: ReviewStatus,
}
