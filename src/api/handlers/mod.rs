//! REST endpoint handlers organized by resource.

pub mod invitations;
pub mod moderation;
pub mod reviews;
pub mod system;
pub mod webhooks;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(reviews::routes())
        .merge(moderation::routes())
        .merge(webhooks::routes())
        .merge(invitations::routes())
}
