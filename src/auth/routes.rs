//! Authentication routes

use axum::{
    routing::{patch, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/v1/auth/sign-up/{send-code,resend-code,verify}` - Registration
/// - `POST /api/v1/auth/sign-in/{send-code,verify}` - Sign-in by mailed code
/// - `POST /api/v1/auth/refresh` - New token pair from a refresh token
/// - `PATCH /api/v1/auth/password` - Change password
/// - `POST /api/v1/auth/password/{forgot,reset}` - Password reset by mailed code
pub fn auth_routes() -> Router {
    Router::new()
        .route(
            "/api/v1/auth/sign-up/send-code",
            post(handlers::send_registration_code),
        )
        .route(
            "/api/v1/auth/sign-up/resend-code",
            post(handlers::resend_registration_code),
        )
        .route(
            "/api/v1/auth/sign-up/verify",
            post(handlers::verify_registration_code),
        )
        .route(
            "/api/v1/auth/sign-in/send-code",
            post(handlers::send_sign_in_code),
        )
        .route(
            "/api/v1/auth/sign-in/verify",
            post(handlers::verify_sign_in_code),
        )
        .route("/api/v1/auth/refresh", post(handlers::refresh))
        .route("/api/v1/auth/password", patch(handlers::update_password))
        .route(
            "/api/v1/auth/password/forgot",
            post(handlers::forgot_password),
        )
        .route("/api/v1/auth/password/reset", post(handlers::reset_password))
}
