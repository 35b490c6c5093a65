//! Invitation scheduling bodies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /invitations`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleInvitationRequest {
    /// Vertical that completed the transaction (`commerce`, `agro`,
    /// `services`, `training`, `mentoring`).
    pub vertical: String,
    /// Order, booking, enrollment or session id.
    pub transaction_id: u64,
    /// User to invite.
    pub user_id: u64,
    /// Hours to wait before sending; the configured default when absent.
    #[serde(default)]
    pub delay_hours: Option<u64>,
}

/// Response of `POST /invitations`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleInvitationResponse {
    /// `false` when the vertical is not known.
    pub scheduled: bool,
}
