//! Review lifecycle events.
//!
//! Every lifecycle transition publishes a [`LifecycleEvent`] through the
//! [`super::EventBus`]. The webhook forwarder turns them into delivery tasks
//! for every subscribed registration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::review::ReviewRecord;
use crate::error::ReviewError;

/// Fixed vocabulary of events external systems can subscribe to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum ReviewEvent {
    /// A review was submitted.
    #[serde(rename = "review.created")]
    Created,
    /// A review moved to `approved`.
    #[serde(rename = "review.approved")]
    Approved,
    /// A review moved to `rejected`.
    #[serde(rename = "review.rejected")]
    Rejected,
    /// A review moved to `flagged`.
    #[serde(rename = "review.flagged")]
    Flagged,
    /// The target's owner responded to a review.
    #[serde(rename = "review.responded")]
    Responded,
    /// A review was deleted.
    #[serde(rename = "review.deleted")]
    Deleted,
}

impl ReviewEvent {
    /// Every event in the vocabulary.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Approved,
        Self::Rejected,
        Self::Flagged,
        Self::Responded,
        Self::Deleted,
    ];

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "review.created",
            Self::Approved => "review.approved",
            Self::Rejected => "review.rejected",
            Self::Flagged => "review.flagged",
            Self::Responded => "review.responded",
            Self::Deleted => "review.deleted",
        }
    }
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewEvent {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ReviewError::Validation(format!("unsupported event: {s}")))
    }
}

/// An event together with the review it concerns, as carried on the bus.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Which lifecycle event happened.
    pub event: ReviewEvent,
    /// Review snapshot after the change.
    pub review: ReviewRecord,
    /// Additional payload fields merged into the webhook `data` object.
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Creates an event with no extra data, stamped now.
    #[must_use]
    pub fn new(event: ReviewEvent, review: ReviewRecord) -> Self {
        Self {
            event,
            review,
            extra: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Adds one extra payload field.
    #[must_use]
    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}
