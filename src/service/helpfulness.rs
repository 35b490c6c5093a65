//! Helpfulness voting.

use std::sync::Arc;

use crate::domain::{ReviewKind, VoteKey, VoteSummary, VoteType};
use crate::error::ReviewError;
use crate::persistence::{ReviewStore, VoteStore};

/// Records helpfulness votes and maintains the Wilson ranking score.
#[derive(Debug, Clone)]
pub struct HelpfulnessService {
    reviews: Arc<dyn ReviewStore>,
    votes: Arc<dyn VoteStore>,
}

impl HelpfulnessService {
    /// Creates a new `HelpfulnessService`.
    #[must_use]
    pub fn new(reviews: Arc<dyn ReviewStore>, votes: Arc<dyn VoteStore>) -> Self {
        Self { reviews, votes }
    }

    /// Casts, replaces or retracts `user_id`'s vote on a review.
    ///
    /// Voting the same way twice removes the vote. Counts are always
    /// re-read from the vote table after the change, and the review's
    /// denormalized columns are refreshed on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`] if the review does not exist and
    /// propagates vote store failures.
    pub async fn vote(
        &self,
        kind: ReviewKind,
        review_id: u64,
        user_id: u64,
        helpful: bool,
    ) -> Result<VoteSummary, ReviewError> {
        if self.reviews.load(kind, review_id).await?.is_none() {
            return Err(ReviewError::NotFound(format!("review {kind}/{review_id}")));
        }

        let requested = VoteType::from_helpful(helpful);
        let key = VoteKey {
            kind,
            review_id,
            user_id,
        };
        let change = self.votes.apply_vote(key, requested).await?;
        let tally = self.votes.tally(kind, review_id).await?;
        let summary = VoteSummary::new(tally, change.resulting_vote(requested));

        if kind.schema().tracks_helpfulness {
            if let Err(e) = self
                .reviews
                .write_helpfulness(kind, review_id, tally, summary.wilson_score)
                .await
            {
                tracing::warn!(kind = %kind, review_id, error = %e, "helpfulness write-back failed");
            }
        }

        tracing::debug!(
            kind = %kind,
            review_id,
            user_id,
            change = ?change,
            wilson_score = summary.wilson_score,
            "vote recorded"
        );
        Ok(summary)
    }
}
