//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All resource endpoints are mounted under `/api/v1`. With the
//! `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "review-engine", description = "Review aggregation, moderation and webhook API"),
    paths(
        handlers::system::health_handler,
        handlers::system::review_kinds_handler,
        handlers::reviews::list,
        handlers::reviews::get_stats,
        handlers::reviews::vote,
        handlers::reviews::moderate,
        handlers::reviews::flag,
        handlers::reviews::report,
        handlers::reviews::respond,
        handlers::moderation::pending,
        handlers::moderation::counts,
        handlers::webhooks::register,
        handlers::webhooks::unregister,
        handlers::invitations::schedule,
    ),
    tags(
        (name = "System", description = "Health and catalog"),
        (name = "Reviews", description = "Listings, stats, votes and owner responses"),
        (name = "Moderation", description = "Moderation decisions and queue"),
        (name = "Webhooks", description = "Lifecycle event subscriptions"),
        (name = "Invitations", description = "Post-transaction review invitations"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/reviews/{kind}/list",
            "/api/v1/reviews/{kind}/{id}/vote",
            "/api/v1/reviews/{kind}/{id}/report",
            "/api/v1/moderation/pending",
            "/api/v1/webhooks/{id}",
            "/api/v1/invitations",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
