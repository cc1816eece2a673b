// Application state shared across all modules

use std::sync::Arc;

use crate::auth::{AuthService, TokenIssuer};
use crate::common::config::AvatarStorage;
use crate::users::UserService;

/// Handles to the two components plus what the extractors need.
/// Everything inside is cheap to clone and safe to share between requests.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub tokens: Arc<TokenIssuer>,
    pub avatars: AvatarStorage,
}
