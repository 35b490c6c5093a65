//! Query parameters and bodies of the moderation queue endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::ReviewRecord;

/// Largest page the pending queue returns.
pub const MAX_PENDING_LIMIT: usize = 200;

/// Query of `GET /moderation/pending`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PendingQuery {
    /// Review kind machine name.
    pub kind: String,
    /// Restrict to one tenant.
    pub tenant_id: Option<u64>,
    /// Page size (1–200). Defaults to 50.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl PendingQuery {
    /// Limit clamped to the allowed range.
    #[must_use]
    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, MAX_PENDING_LIMIT)
    }
}

fn default_limit() -> usize {
    50
}

/// Query of `GET /moderation/counts`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CountsQuery {
    /// Restrict to one tenant.
    pub tenant_id: Option<u64>,
}

/// Pending reviews of one kind.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingListResponse {
    /// Reviews, oldest first.
    pub data: Vec<ReviewRecord>,
    /// Number of reviews returned.
    pub count: usize,
}

/// Pending counts for the moderation dashboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingCountsResponse {
    /// Count per kind machine name; kinds with nothing pending are absent.
    pub counts: BTreeMap<String, u64>,
    /// Sum over all kinds.
    pub total: u64,
}
