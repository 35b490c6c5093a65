//! Post-transaction review invitations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ReviewKind;

/// Business vertical that completed a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Vertical {
    /// Online commerce orders.
    Commerce,
    /// Agro marketplace orders.
    Agro,
    /// Service bookings.
    Services,
    /// Course enrollments.
    Training,
    /// Mentoring sessions.
    Mentoring,
}

impl Vertical {
    /// Returns the machine name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commerce => "commerce",
            Self::Agro => "agro",
            Self::Services => "services",
            Self::Training => "training",
            Self::Mentoring => "mentoring",
        }
    }

    /// The review kind users of this vertical are invited to write.
    #[must_use]
    pub const fn review_kind(&self) -> ReviewKind {
        match self {
            Self::Commerce => ReviewKind::Commerce,
            Self::Agro => ReviewKind::Agro,
            Self::Services => ReviewKind::Services,
            Self::Training => ReviewKind::Course,
            Self::Mentoring => ReviewKind::Mentoring,
        }
    }
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vertical {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commerce" => Ok(Self::Commerce),
            "agro" => Ok(Self::Agro),
            "services" => Ok(Self::Services),
            "training" => Ok(Self::Training),
            "mentoring" => Ok(Self::Mentoring),
            _ => Err(()),
        }
    }
}

/// Queued invitation, re-enqueued unchanged until `send_after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationTask {
    /// Vertical that completed the transaction.
    pub vertical: Vertical,
    /// Transaction id, matched against the kind's target field.
    pub transaction_id: u64,
    /// User to invite.
    pub user_id: u64,
    /// Earliest send time.
    pub send_after: DateTime<Utc>,
    /// Kind of review the user is invited to write.
    pub review_kind: ReviewKind,
}

impl InvitationTask {
    /// Returns `true` once the delay has elapsed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.send_after
    }
}

/// How a processed invitation task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationOutcome {
    /// Not due yet; put back on the queue.
    Deferred,
    /// User missing or blocked; dropped.
    Skipped,
    /// User already reviewed the transaction; dropped.
    AlreadyReviewed,
    /// Email handed to the mailer; dropped.
    Sent,
    /// Mailer failed; dropped anyway.
    SendFailed,
}
