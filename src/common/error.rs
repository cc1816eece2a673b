// Error handling types for the service and the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::error;

use super::validation::ValidationResult;

/// Coarse classification of a domain error, used by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Internal,
    TryAgainLater,
    InvalidInput,
    Unauthorized,
    NotFound,
    Conflict,
    Validation,
    Cooldown,
}

/// Errors returned by the account workflow and profile components.
///
/// Infrastructure failures are logged where they happen and collapse into
/// `Internal`; everything else is a rule violation the caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("internal server error")]
    Internal,
    #[error("internal server error, please try again later")]
    TryAgainLater,

    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid code")]
    InvalidCode,
    #[error("invalid old password")]
    InvalidOldPassword,
    #[error("invalid forgot-password code")]
    InvalidForgotPasswordCode,

    #[error("user is not authorized")]
    Unauthorized,

    #[error("user not found")]
    UserNotFound,

    #[error("user with this email already exists")]
    EmailAlreadyExists,
    #[error("user with this username already exists")]
    UsernameAlreadyExists,
    #[error("you are already following this user")]
    AlreadyFollowing,
    #[error("you have already subscribed to this user")]
    AlreadySubscribed,
    #[error("fields not allowed to update: {}", .0.join(", "))]
    FieldsNotAllowedToUpdate(Vec<String>),
    #[error("link with type '{0}' has already been set")]
    SocialLinkAlreadySet(String),

    #[error("you cannot follow yourself")]
    CannotFollowYourself,
    #[error("you cannot subscribe to yourself")]
    CannotSubscribeToYourself,
    #[error("username cannot contain special characters")]
    UsernameCannotContainSpecialCharacters,
    #[error("file must be an image")]
    FileMustBeImage,
    #[error("file must have a valid extension")]
    FileMustHaveValidExtension,
    #[error("file is too large")]
    FileTooLarge,
    #[error("failed to upload avatar to CDN")]
    FailedToUploadAvatarToCDN,
    #[error("link has invalid type")]
    LinkHasInvalidType,
    #[error("link is unreachable")]
    LinkIsUnreachable,
    #[error("maximum number of social links achieved")]
    MaxSocialLinksAchieved,

    #[error("cooldown, please try again later")]
    Cooldown,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        use ServiceError::*;

        match self {
            Internal => ErrorKind::Internal,
            TryAgainLater => ErrorKind::TryAgainLater,
            InvalidCredentials | InvalidCode | InvalidOldPassword | InvalidForgotPasswordCode => {
                ErrorKind::InvalidInput
            }
            Unauthorized => ErrorKind::Unauthorized,
            UserNotFound => ErrorKind::NotFound,
            EmailAlreadyExists
            | UsernameAlreadyExists
            | AlreadyFollowing
            | AlreadySubscribed
            | FieldsNotAllowedToUpdate(_)
            | SocialLinkAlreadySet(_) => ErrorKind::Conflict,
            CannotFollowYourself
            | CannotSubscribeToYourself
            | UsernameCannotContainSpecialCharacters
            | FileMustBeImage
            | FileMustHaveValidExtension
            | FileTooLarge
            | LinkHasInvalidType
            | LinkIsUnreachable
            | MaxSocialLinksAchieved => ErrorKind::Validation,
            FailedToUploadAvatarToCDN => ErrorKind::Internal,
            Cooldown => ErrorKind::Cooldown,
        }
    }
}

/// Log an infrastructure failure and collapse it into `ServiceError::Internal`
///
/// ```ignore
/// store.find_by_id(id).await.map_err(internal("failed to load user"))?;
/// ```
pub fn internal<E: fmt::Display>(context: &'static str) -> impl FnOnce(E) -> ServiceError {
    move |e| {
        error!(error = %e, "{}", context);
        ServiceError::Internal
    }
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    InternalServer(String),
    ServiceUnavailable(String),
    ValidationError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::TooManyRequests(msg) => write!(f, "Too Many Requests: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub details: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, details, code) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT"),
            ApiError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, "TOO_MANY_REQUESTS")
            }
            ApiError::InternalServer(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "INTERNAL_SERVER_ERROR",
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
        };

        let error_response = ErrorResponse {
            ok: false,
            details,
            code: code.to_string(),
            timestamp: Utc::now(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let details = err.to_string();
        match err.kind() {
            ErrorKind::Internal => ApiError::InternalServer(details),
            ErrorKind::TryAgainLater => ApiError::ServiceUnavailable(details),
            ErrorKind::InvalidInput | ErrorKind::Validation => ApiError::BadRequest(details),
            ErrorKind::Unauthorized => ApiError::Unauthorized(details),
            ErrorKind::NotFound => ApiError::NotFound(details),
            ErrorKind::Conflict => ApiError::Conflict(details),
            ErrorKind::Cooldown => ApiError::TooManyRequests(details),
        }
    }
}

/// Helper function to convert ValidationResult to ApiError
impl From<ValidationResult> for ApiError {
    fn from(result: ValidationResult) -> Self {
        if result.is_valid {
            ApiError::InternalServer(
                "Validation result was valid but converted to error".to_string(),
            )
        } else {
            let error_messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            ApiError::ValidationError(error_messages.join(", "))
        }
    }
}
