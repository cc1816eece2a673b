//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::common::{ApiError, AppState, ErrorKind};
use crate::users::{FullUser, Role};

/// Authenticated user extractor
///
/// Validates the `Authorization: Bearer <access token>` header and loads the
/// user through the cache-aside read path. Every failure is a 401.
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub role: Role,
    pub user: FullUser,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(app_state): Extension<Arc<AppState>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let token = bearer_token(parts).ok_or_else(|| {
            warn!("Authentication failed: missing Authorization header");
            ApiError::Unauthorized("user is not authorized".into())
        })?;

        let claims = app_state.tokens.decode_access(token).map_err(|e| {
            warn!(error = %e, "Access token validation failed");
            ApiError::Unauthorized("user is not authorized".into())
        })?;

        let user = app_state
            .user_service
            .find_by_id(&claims.id)
            .await
            .map_err(|e| {
                if e.kind() != ErrorKind::NotFound {
                    warn!(error = %e, user_id = %claims.id, "Failed to load authenticated user");
                } else {
                    warn!(user_id = %claims.id, "Authentication failed: user not found");
                }
                ApiError::Unauthorized("user is not authorized".into())
            })?;

        debug!(user_id = %user.id, "User authenticated via extractor");

        Ok(AuthedUser {
            id: user.id.clone(),
            role: user.role,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/users/@me");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
