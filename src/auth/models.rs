//! Authentication data models

use serde::{Deserialize, Serialize};

use crate::users::{PublicUser, Role};

/// Access token claims
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccessClaims {
    pub id: String,
    pub role: Role,
    pub exp: usize,
}

/// Refresh token claims; carries no role so a refresh always re-reads it
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RefreshClaims {
    pub id: String,
    pub exp: usize,
}

/// Freshly issued access/refresh pair; expiries are unix seconds
#[derive(Serialize, Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_exp: i64,
    pub refresh_token_exp: i64,
}

/// Registration staged under `registration-code:<code>`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingRegistration {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// Sign-in or password reset staged under a one-time code
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingSession {
    pub user_id: String,
    pub username: String,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Deserialize, Debug)]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct SignInRequest {
    pub email_or_username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub code: u64,
}

#[derive(Deserialize, Debug, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub code: u64,
    pub new_password: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize, Debug)]
pub struct BasicResponse {
    pub ok: bool,
}

impl BasicResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Serialize, Debug)]
pub struct AuthResponse {
    pub ok: bool,
    pub access_token: String,
    pub user: PublicUser,
}

#[derive(Serialize, Debug)]
pub struct RefreshResponse {
    pub ok: bool,
    pub access_token: String,
    pub refresh_token: String,
}
