// src/users/handlers.rs

use axum::{
    extract::{Extension, Json, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::fs as tokio_fs;
use tracing::{info, warn};

use super::avatar::{content_type_for, sanitize_filename};
use super::models::{
    AddSocialLinkRequest, FullUser, PageQuery, PublicUser, Relation, RelationSide, RelatedUser,
    SearchQuery, UserPatch,
};
use super::validators::ProfileValidator;
use crate::auth::AuthedUser;
use crate::common::config::AvatarStorage;
use crate::common::{ApiError, AppState, Validator};

// ============================================================================
// Own profile
// ============================================================================

/// GET /api/v1/users/@me - Current user's full profile
pub async fn get_me(authed: AuthedUser) -> Json<FullUser> {
    Json(authed.user)
}

/// PATCH /api/v1/users/@me - Partial profile update
///
/// Only `username`, `display_name`, `bio` and `avatar_url` may be sent;
/// `null` clears the nullable ones.
pub async fn update_me(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Json<FullUser>, ApiError> {
    let patch = UserPatch::from_fields(fields)?
        .ok_or_else(|| ApiError::BadRequest("invalid field types".to_string()))?;

    let validation = ProfileValidator.validate(&patch);
    if !validation.is_valid {
        return Err(ApiError::from(validation));
    }

    let updated = state.user_service.update(&authed.user, patch).await?;
    Ok(Json(updated))
}

/// PUT /api/v1/users/@me/avatar - Upload avatar (multipart field `file`)
pub async fn upload_avatar(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    info!(user_id = %authed.id, "Avatar upload initiated");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .ok_or_else(|| ApiError::BadRequest("No filename provided".to_string()))?
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file data".to_string()))?;

        let avatar_url = state
            .user_service
            .set_avatar(&authed.user, &file_name, data)
            .await?;

        return Ok(Json(json!({ "ok": true, "avatar_url": avatar_url })));
    }

    Err(ApiError::BadRequest("No avatar file found".to_string()))
}

/// DELETE /api/v1/users/@me/avatar - Remove avatar
pub async fn remove_avatar(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
) -> Result<Json<Value>, ApiError> {
    state.user_service.remove_avatar(&authed.user).await?;
    Ok(Json(json!({ "ok": true })))
}

/// PUT /api/v1/users/@me/social-links - Attach a social profile link
pub async fn add_social_link(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Json(request): Json<AddSocialLinkRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let validation = ProfileValidator.validate(&request);
    if !validation.is_valid {
        return Err(ApiError::from(validation));
    }

    state
        .user_service
        .add_social_link(&authed.user, &request.link)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

/// DELETE /api/v1/users/@me/social-links/:platform
pub async fn delete_social_link(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .user_service
        .delete_social_link(&authed.user, &platform)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

// ============================================================================
// Relation listings
// ============================================================================

async fn my_relations(
    state: &AppState,
    authed: &AuthedUser,
    relation: Relation,
    side: RelationSide,
    page: PageQuery,
) -> Result<Json<Vec<RelatedUser>>, ApiError> {
    let users = state
        .user_service
        .list_relations(
            relation,
            side,
            &authed.id,
            page.limit,
            page.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(users))
}

/// GET /api/v1/users/@me/followers
pub async fn my_followers(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<RelatedUser>>, ApiError> {
    my_relations(&state, &authed, Relation::Follow, RelationSide::Incoming, page).await
}

/// GET /api/v1/users/@me/follows
pub async fn my_follows(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<RelatedUser>>, ApiError> {
    my_relations(&state, &authed, Relation::Follow, RelationSide::Outgoing, page).await
}

/// GET /api/v1/users/@me/subscribers
pub async fn my_subscribers(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<RelatedUser>>, ApiError> {
    my_relations(&state, &authed, Relation::Subscribe, RelationSide::Incoming, page).await
}

/// GET /api/v1/users/@me/subscriptions
pub async fn my_subscriptions(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<RelatedUser>>, ApiError> {
    my_relations(&state, &authed, Relation::Subscribe, RelationSide::Outgoing, page).await
}

// ============================================================================
// Other users
// ============================================================================

/// GET /api/v1/users/byUsername/:username - Public profile, `@` prefix optional
pub async fn get_by_username(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<PublicUser>, ApiError> {
    let username = username.strip_prefix('@').unwrap_or(&username);
    let user = state.user_service.find_by_username(username).await?;
    Ok(Json(PublicUser::from(user)))
}

/// GET /api/v1/users/search?q=&limit=&offset=
pub async fn search(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<RelatedUser>>, ApiError> {
    let users = state
        .user_service
        .search_by_username(&query.q, query.limit, query.offset.unwrap_or(0))
        .await?;
    Ok(Json(users))
}

/// PUT /api/v1/users/follow/:user_id
pub async fn follow(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.user_service.follow(&authed.id, &user_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// DELETE /api/v1/users/follow/:user_id
pub async fn unfollow(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.user_service.unfollow(&authed.id, &user_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// PUT /api/v1/users/subscribe/:user_id
pub async fn subscribe(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.user_service.subscribe(&authed.id, &user_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// DELETE /api/v1/users/subscribe/:user_id
pub async fn unsubscribe(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.user_service.unsubscribe(&authed.id, &user_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /public/avatars/:file - Serve locally stored avatars
pub async fn serve_avatar(
    Extension(state): Extension<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let AvatarStorage::Local { dir, .. } = &state.avatars else {
        return Err(ApiError::NotFound("Avatar not found".to_string()));
    };

    // Sanitize filename to prevent path traversal
    let safe_filename = sanitize_filename(&filename);
    let file_path = dir.join(&safe_filename);

    let file_content = match tokio_fs::read(&file_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Avatar not found".to_string()));
        }
        Err(e) => {
            warn!(error = %e, file = %safe_filename, "Failed to read avatar file");
            return Err(ApiError::InternalServer(
                "Failed to read avatar file".to_string(),
            ));
        }
    };

    Ok((
        StatusCode::OK,
        [
            ("Content-Type", content_type_for(&safe_filename)),
            ("Cache-Control", "public, max-age=31536000"),
        ],
        file_content,
    ))
}
