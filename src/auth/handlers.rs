//! Authentication handlers

use axum::{
    extract::{Extension, Json},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use super::extractors::AuthedUser;
use super::models::{
    AuthResponse, BasicResponse, ForgotPasswordRequest, RefreshRequest, RefreshResponse,
    ResetPasswordRequest, SignInRequest, SignUpRequest, TokenPair, UpdatePasswordRequest,
    VerifyCodeRequest,
};
use super::validators::AuthValidator;
use crate::common::{safe_email_log, ApiError, AppState, Validator};
use crate::users::PublicUser;

pub const REFRESH_COOKIE: &str = "refresh_token";

fn validated<T>(data: &T) -> Result<(), ApiError>
where
    AuthValidator: Validator<T>,
{
    let result = AuthValidator.validate(data);
    if result.is_valid {
        Ok(())
    } else {
        Err(ApiError::from(result))
    }
}

fn refresh_cookie(token: &str, max_age_secs: u64) -> Result<HeaderValue, ApiError> {
    let cookie = [
        format!("{}={}", REFRESH_COOKIE, token),
        "Path=/api/v1/auth".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Strict".to_string(),
        format!("Max-Age={}", max_age_secs),
    ]
    .join("; ");

    HeaderValue::from_str(&cookie).map_err(|e| {
        error!(error = %e, "Failed to build refresh cookie");
        ApiError::InternalServer("internal server error".to_string())
    })
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn signed_in(state: &AppState, user: PublicUser, tokens: TokenPair) -> Result<Response, ApiError> {
    let cookie = refresh_cookie(&tokens.refresh_token, state.tokens.refresh_ttl().as_secs())?;
    let body = AuthResponse {
        ok: true,
        access_token: tokens.access_token,
        user,
    };

    let mut response = Json(body).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

// ============================================================================
// Sign-up
// ============================================================================

/// POST /api/v1/auth/sign-up/send-code - Stage a registration and mail its code
pub async fn send_registration_code(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Json<BasicResponse>, ApiError> {
    validated(&payload)?;
    info!(email = %safe_email_log(&payload.email), "Sign-up code requested");

    state
        .auth_service
        .send_registration_code(&payload.email, &payload.username, &payload.password)
        .await?;

    Ok(Json(BasicResponse::ok()))
}

/// POST /api/v1/auth/sign-up/resend-code - Issue a fresh registration code
pub async fn resend_registration_code(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Json<BasicResponse>, ApiError> {
    validated(&payload)?;

    state
        .auth_service
        .resend_registration_code(&payload.email, &payload.username, &payload.password)
        .await?;

    Ok(Json(BasicResponse::ok()))
}

/// POST /api/v1/auth/sign-up/verify - Create the account from a code
///
/// # Response
/// ```json
/// { "ok": true, "access_token": "<jwt>", "user": { ... } }
/// ```
/// The refresh token is set as an HttpOnly cookie.
pub async fn verify_registration_code(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Response, ApiError> {
    let (user, tokens) = state
        .auth_service
        .verify_registration_code(payload.code)
        .await?;

    signed_in(&state, user, tokens)
}

// ============================================================================
// Sign-in
// ============================================================================

/// POST /api/v1/auth/sign-in/send-code - Check credentials and mail a code
pub async fn send_sign_in_code(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<BasicResponse>, ApiError> {
    validated(&payload)?;

    state
        .auth_service
        .send_sign_in_code(&payload.email_or_username, &payload.password)
        .await?;

    Ok(Json(BasicResponse::ok()))
}

/// POST /api/v1/auth/sign-in/verify
pub async fn verify_sign_in_code(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Response, ApiError> {
    let (user, tokens) = state.auth_service.verify_sign_in_code(payload.code).await?;
    signed_in(&state, user, tokens)
}

/// POST /api/v1/auth/refresh - Trade a refresh token for a new pair
///
/// The token is read from the JSON body first, then from the cookie.
pub async fn refresh(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Response, ApiError> {
    let from_body = payload.and_then(|Json(body)| body.refresh_token);
    let token = from_body
        .or_else(|| cookie_value(&headers, REFRESH_COOKIE).map(str::to_string))
        .ok_or_else(|| ApiError::Unauthorized("user is not authorized".to_string()))?;

    let tokens = state.auth_service.refresh_tokens(&token).await?;

    let cookie = refresh_cookie(&tokens.refresh_token, state.tokens.refresh_ttl().as_secs())?;
    let mut response = Json(RefreshResponse {
        ok: true,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    })
    .into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

// ============================================================================
// Passwords
// ============================================================================

/// PATCH /api/v1/auth/password - Change password (requires authentication)
pub async fn update_password(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<BasicResponse>, ApiError> {
    validated(&payload)?;

    state
        .auth_service
        .update_password(&authed.id, &payload.old_password, &payload.new_password)
        .await?;

    Ok(Json(BasicResponse::ok()))
}

/// POST /api/v1/auth/password/forgot - Mail a reset code
///
/// Always answers `ok` for a well-formed email, known or not.
pub async fn forgot_password(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<BasicResponse>, ApiError> {
    validated(&payload)?;

    state
        .auth_service
        .request_forgot_password_code(&payload.email)
        .await?;

    Ok(Json(BasicResponse::ok()))
}

/// POST /api/v1/auth/password/reset - Set a new password from a reset code
pub async fn reset_password(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<BasicResponse>, ApiError> {
    validated(&payload)?;

    state
        .auth_service
        .change_forgotten_password(payload.code, &payload.new_password)
        .await?;

    Ok(Json(BasicResponse::ok()))
}
