//! Delayed review invitations after completed transactions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{InvitationOutcome, InvitationTask, Vertical};
use crate::error::ReviewError;
use crate::persistence::{ReviewStore, TaskQueue, UserStore};
use crate::service::mailer::Mailer;

/// Mail template sent to invited users.
pub const INVITATION_TEMPLATE: &str = "review_invitation";

/// Schedules invitations and processes them once due.
#[derive(Debug, Clone)]
pub struct InvitationService {
    reviews: Arc<dyn ReviewStore>,
    users: Arc<dyn UserStore>,
    queue: Arc<dyn TaskQueue<InvitationTask>>,
    mailer: Arc<dyn Mailer>,
    default_delay_hours: u64,
}

impl InvitationService {
    /// Creates a new `InvitationService`.
    #[must_use]
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        users: Arc<dyn UserStore>,
        queue: Arc<dyn TaskQueue<InvitationTask>>,
        mailer: Arc<dyn Mailer>,
        default_delay_hours: u64,
    ) -> Self {
        Self {
            reviews,
            users,
            queue,
            mailer,
            default_delay_hours,
        }
    }

    /// Queues an invitation to be sent `delay_hours` from now (the
    /// configured default when `None`).
    ///
    /// Returns `Ok(false)` for an unknown vertical.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Validation`] if the due time is not
    /// representable and propagates queue failures.
    pub async fn schedule_invitation(
        &self,
        vertical: &str,
        transaction_id: u64,
        user_id: u64,
        delay_hours: Option<u64>,
    ) -> Result<bool, ReviewError> {
        let hours = delay_hours.unwrap_or(self.default_delay_hours);
        let send_after = i64::try_from(hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| ReviewError::Validation(format!("delay out of range: {hours}h")))?;
        self.schedule_invitation_at(vertical, transaction_id, user_id, send_after)
            .await
    }

    /// Queues an invitation that becomes due at `send_after`.
    ///
    /// # Errors
    ///
    /// Propagates queue failures.
    pub async fn schedule_invitation_at(
        &self,
        vertical: &str,
        transaction_id: u64,
        user_id: u64,
        send_after: DateTime<Utc>,
    ) -> Result<bool, ReviewError> {
        let Ok(vertical) = vertical.parse::<Vertical>() else {
            tracing::warn!(vertical, transaction_id, "unknown vertical, invitation not scheduled");
            return Ok(false);
        };

        self.queue
            .enqueue(InvitationTask {
                vertical,
                transaction_id,
                user_id,
                send_after,
                review_kind: vertical.review_kind(),
            })
            .await?;

        tracing::debug!(
            vertical = %vertical,
            transaction_id,
            user_id,
            send_after = %send_after,
            "invitation scheduled"
        );
        Ok(true)
    }

    /// Processes one claimed task against the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::process_invitation_at`].
    pub async fn process_invitation(
        &self,
        task: InvitationTask,
    ) -> Result<InvitationOutcome, ReviewError> {
        self.process_invitation_at(task, Utc::now()).await
    }

    /// Processes one claimed task as of `now`.
    ///
    /// Tasks that are not yet due go back on the queue unchanged. A mail
    /// failure is logged and the task is dropped.
    ///
    /// # Errors
    ///
    /// Propagates store and queue failures.
    pub async fn process_invitation_at(
        &self,
        task: InvitationTask,
        now: DateTime<Utc>,
    ) -> Result<InvitationOutcome, ReviewError> {
        if !task.is_due(now) {
            self.queue.enqueue(task).await?;
            return Ok(InvitationOutcome::Deferred);
        }

        let user = match self.users.load_user(task.user_id).await? {
            Some(user) if !user.blocked => user,
            _ => {
                tracing::debug!(user_id = task.user_id, "invitee missing or blocked");
                return Ok(InvitationOutcome::Skipped);
            }
        };

        if self
            .reviews
            .has_review_by_author(task.review_kind, task.user_id, task.transaction_id)
            .await?
        {
            tracing::debug!(
                user_id = task.user_id,
                transaction_id = task.transaction_id,
                "already reviewed, invitation dropped"
            );
            return Ok(InvitationOutcome::AlreadyReviewed);
        }

        let params = serde_json::json!({
            "user_name": user.display_name,
            "vertical": task.vertical.as_str(),
            "review_kind": task.review_kind.as_str(),
            "transaction_id": task.transaction_id,
        });
        match self
            .mailer
            .send(INVITATION_TEMPLATE, &user.email, &user.preferred_language, &params)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    user_id = task.user_id,
                    vertical = %task.vertical,
                    transaction_id = task.transaction_id,
                    "review invitation sent"
                );
                Ok(InvitationOutcome::Sent)
            }
            Err(e) => {
                tracing::error!(user_id = task.user_id, error = %e, "review invitation failed");
                Ok(InvitationOutcome::SendFailed)
            }
        }
    }
}
