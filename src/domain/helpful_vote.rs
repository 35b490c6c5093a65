//! Helpfulness votes and the Wilson lower-bound ranking score.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::review_kind::ReviewKind;

/// z-value for a 95% confidence interval.
pub const WILSON_Z: f64 = 1.96;

/// A user's opinion on a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    /// The review was useful.
    Helpful,
    /// The review was not useful.
    NotHelpful,
}

impl VoteType {
    /// Maps the boolean API flag to a vote type.
    #[must_use]
    pub const fn from_helpful(helpful: bool) -> Self {
        if helpful { Self::Helpful } else { Self::NotHelpful }
    }

    /// Returns the stored string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::NotHelpful => "not_helpful",
        }
    }
}

/// Unique key of a vote: one vote per user per review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoteKey {
    /// Review family.
    pub kind: ReviewKind,
    /// Review id.
    pub review_id: u64,
    /// Voting user.
    pub user_id: u64,
}

/// What a vote call did to the stored vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    /// No previous vote; a new one was stored.
    Inserted,
    /// The previous vote had the other type and was replaced.
    Changed,
    /// The same vote was cast again and was retracted.
    Removed,
}

impl VoteChange {
    /// Decides what casting `requested` does given the stored vote.
    ///
    /// Casting the stored vote again retracts it.
    #[must_use]
    pub fn decide(existing: Option<VoteType>, requested: VoteType) -> Self {
        match existing {
            None => Self::Inserted,
            Some(current) if current == requested => Self::Removed,
            Some(_) => Self::Changed,
        }
    }

    /// The user's vote after the change.
    #[must_use]
    pub const fn resulting_vote(&self, requested: VoteType) -> Option<VoteType> {
        match self {
            Self::Inserted | Self::Changed => Some(requested),
            Self::Removed => None,
        }
    }
}

/// Vote counts for one review, read from the vote table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    /// Number of `helpful` votes.
    pub helpful: u64,
    /// Number of `not_helpful` votes.
    pub not_helpful: u64,
}

impl VoteTally {
    /// Wilson lower bound of the tally, rounded to 4 decimals.
    #[must_use]
    pub fn wilson_score(&self) -> f64 {
        round4(wilson_lower_bound(self.helpful, self.not_helpful))
    }
}

/// Result of a vote, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VoteSummary {
    /// Number of `helpful` votes.
    pub helpful_count: u64,
    /// Number of `not_helpful` votes.
    pub not_helpful_count: u64,
    /// Wilson lower bound, 4 decimals.
    pub wilson_score: f64,
    /// The caller's vote after the call, `None` after a toggle-off.
    pub user_vote: Option<VoteType>,
}

impl VoteSummary {
    /// Builds the summary from a fresh tally.
    #[must_use]
    pub fn new(tally: VoteTally, user_vote: Option<VoteType>) -> Self {
        Self {
            helpful_count: tally.helpful,
            not_helpful_count: tally.not_helpful,
            wilson_score: tally.wilson_score(),
            user_vote,
        }
    }
}

/// Lower bound of the Wilson score interval at 95% confidence.
///
/// Ranks by confidence that the positive ratio is high rather than by raw
/// count, so one positive vote does not outrank ninety positives out of a
/// hundred. Returns `0.0` when there are no votes.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn wilson_lower_bound(positive: u64, negative: u64) -> f64 {
    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let phat = positive as f64 / n;
    let z2 = WILSON_Z * WILSON_Z;
    let centre = phat + z2 / (2.0 * n);
    let margin = WILSON_Z * ((phat * (1.0 - phat) + z2 / (4.0 * n)) / n).sqrt();
    (centre - margin) / (1.0 + z2 / n)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decide_covers_every_stored_state() {
        use VoteType::{Helpful, NotHelpful};
        assert_eq!(VoteChange::decide(None, Helpful), VoteChange::Inserted);
        assert_eq!(VoteChange::decide(Some(Helpful), Helpful), VoteChange::Removed);
        assert_eq!(VoteChange::decide(Some(NotHelpful), NotHelpful), VoteChange::Removed);
        assert_eq!(VoteChange::decide(Some(NotHelpful), Helpful), VoteChange::Changed);
        assert_eq!(VoteChange::decide(Some(Helpful), NotHelpful), VoteChange::Changed);
    }

    fn score(positive: u64, negative: u64) -> f64 {
        VoteTally {
            helpful: positive,
            not_helpful: negative,
        }
        .wilson_score()
    }

    #[test]
    fn no_votes_scores_zero() {
        assert!((score(0, 0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ten_positive() {
        assert!((score(10, 0) - 0.7225).abs() < 1e-9);
    }

    #[test]
    fn one_each() {
        assert!((score(1, 1) - 0.0945).abs() < 1e-9);
    }

    #[test]
    fn hundred_positive() {
        assert!((score(100, 0) - 0.9630).abs() < 1e-9);
    }

    #[test]
    fn all_negative_scores_zero() {
        assert!(wilson_lower_bound(0, 25).abs() < 1e-12);
    }

    #[test]
    fn more_evidence_ranks_higher_at_same_ratio() {
        assert!(wilson_lower_bound(90, 10) > wilson_lower_bound(9, 1));
        assert!(wilson_lower_bound(9, 1) > wilson_lower_bound(1, 0));
    }

    #[test]
    fn change_resulting_vote() {
        assert_eq!(
            VoteChange::Inserted.resulting_vote(VoteType::Helpful),
            Some(VoteType::Helpful)
        );
        assert_eq!(VoteChange::Removed.resulting_vote(VoteType::Helpful), None);
    }

    #[test]
    fn vote_type_from_flag() {
        assert_eq!(VoteType::from_helpful(true), VoteType::Helpful);
        assert_eq!(VoteType::from_helpful(false).as_str(), "not_helpful");
    }
}
