//! Abuse reports filed by readers against a review.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::review_kind::ReviewKind;
use crate::error::ReviewError;

/// Why a review was reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AbuseReason {
    /// Advertising or unrelated content.
    Spam,
    /// Insults or harassment.
    Offensive,
    /// Not based on a real experience.
    Fake,
    /// Anything else; see the details.
    #[default]
    Other,
}

impl AbuseReason {
    /// Returns the stored string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Offensive => "offensive",
            Self::Fake => "fake",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AbuseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbuseReason {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(Self::Spam),
            "offensive" => Ok(Self::Offensive),
            "fake" => Ok(Self::Fake),
            "other" => Ok(Self::Other),
            other => Err(ReviewError::Validation(format!(
                "unsupported report reason: {other} (allowed: spam, offensive, fake, other)"
            ))),
        }
    }
}

/// One user's report against one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseReport {
    /// Review family.
    pub kind: ReviewKind,
    /// Reported review.
    pub review_id: u64,
    /// Reporting user.
    pub reporter_id: u64,
    /// Report category.
    pub reason: AbuseReason,
    /// Free text, trimmed; empty when none was given.
    pub details: String,
    /// Filing time.
    pub created_at: DateTime<Utc>,
}

impl AbuseReport {
    /// Creates a report filed now. `details` is trimmed.
    #[must_use]
    pub fn new(
        kind: ReviewKind,
        review_id: u64,
        reporter_id: u64,
        reason: AbuseReason,
        details: &str,
    ) -> Self {
        Self {
            kind,
            review_id,
            reporter_id,
            reason,
            details: details.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}
