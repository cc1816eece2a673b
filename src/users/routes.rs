//! User profile & relationship routes

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};

use super::handlers;

/// Creates and returns the users router
///
/// `avatar_body_limit` caps the multipart body of avatar uploads; the file
/// size itself is checked again by the service.
///
/// # Routes
/// - `GET|PATCH /api/v1/users/@me` - Own profile
/// - `PUT|DELETE /api/v1/users/@me/avatar` - Avatar upload / removal
/// - `PUT /api/v1/users/@me/social-links` - Add social link
/// - `DELETE /api/v1/users/@me/social-links/:platform` - Remove social link
/// - `GET /api/v1/users/@me/{followers,follows,subscribers,subscriptions}`
/// - `GET /api/v1/users/byUsername/:username` - Public profile
/// - `GET /api/v1/users/search` - Username search
/// - `PUT|DELETE /api/v1/users/follow/:user_id`
/// - `PUT|DELETE /api/v1/users/subscribe/:user_id`
/// - `GET /public/avatars/:file` - Locally stored avatars
pub fn users_routes(avatar_body_limit: usize) -> Router {
    let avatar = Router::new()
        .route(
            "/api/v1/users/@me/avatar",
            put(handlers::upload_avatar).delete(handlers::remove_avatar),
        )
        .layer(DefaultBodyLimit::max(avatar_body_limit));

    Router::new()
        .route(
            "/api/v1/users/@me",
            get(handlers::get_me).patch(handlers::update_me),
        )
        .route(
            "/api/v1/users/@me/social-links",
            put(handlers::add_social_link),
        )
        .route(
            "/api/v1/users/@me/social-links/:platform",
            axum::routing::delete(handlers::delete_social_link),
        )
        .route("/api/v1/users/@me/followers", get(handlers::my_followers))
        .route("/api/v1/users/@me/follows", get(handlers::my_follows))
        .route("/api/v1/users/@me/subscribers", get(handlers::my_subscribers))
        .route(
            "/api/v1/users/@me/subscriptions",
            get(handlers::my_subscriptions),
        )
        .route(
            "/api/v1/users/byUsername/:username",
            get(handlers::get_by_username),
        )
        .route("/api/v1/users/search", get(handlers::search))
        .route(
            "/api/v1/users/follow/:user_id",
            put(handlers::follow).delete(handlers::unfollow),
        )
        .route(
            "/api/v1/users/subscribe/:user_id",
            put(handlers::subscribe).delete(handlers::unsubscribe),
        )
        .route("/public/avatars/:file", get(handlers::serve_avatar))
        .merge(avatar)
}
