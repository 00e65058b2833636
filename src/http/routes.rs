use axum::{routing::delete, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn categories() -> Router<AppState> {
    Router::new()
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/categories/:id", delete(handlers::delete_category))
}

pub fn links() -> Router<AppState> {
    Router::new()
        .route(
            "/links/:kind",
            get(handlers::list_links).post(handlers::create_link),
        )
        .route(
            "/links/:kind/:slug",
            get(handlers::get_link)
                .patch(handlers::update_link)
                .delete(handlers::delete_link),
        )
        .route("/links/:kind/:slug/report", post(handlers::report_link))
}

pub fn dashboard() -> Router<AppState> {
    Router::new()
        .route("/dashboard/links", get(handlers::dashboard_links))
        .route("/dashboard/counts", get(handlers::dashboard_counts))
}

pub fn moderation() -> Router<AppState> {
    Router::new()
        .route("/moderation/actions", get(handlers::list_actions))
        .route("/moderation/actions/count", get(handlers::count_actions))
        .route(
            "/moderation/actions/:id/acknowledge",
            post(handlers::acknowledge_action),
        )
        .route("/moderation/links/:kind/:id", get(handlers::review_link))
        .route(
            "/moderation/links/:kind/:id/status",
            post(handlers::set_link_status),
        )
}

pub fn contact() -> Router<AppState> {
    Router::new().route("/contact", post(handlers::submit_contact))
}
