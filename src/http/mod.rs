use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::services::ServeDir;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{AdminToken, AuthUser, MaybeAuthUser, Moderator};
pub use error::AppError;

/// Base64 inflates uploads by a third; leave room for the JSON around them.
const BODY_LIMIT_HEADROOM: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.upload_max_bytes / 3 * 4 + BODY_LIMIT_HEADROOM;
    let local_media = state.local_media.clone();

    let router = Router::new()
        .merge(routes::health())
        .nest(
            "/v1",
            Router::new()
                .merge(routes::categories())
                .merge(routes::links())
                .merge(routes::dashboard())
                .merge(routes::moderation())
                .merge(routes::contact()),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    match local_media {
        Some(media) => router.nest_service(&media.url_prefix, ServeDir::new(media.root)),
        None => router,
    }
}
