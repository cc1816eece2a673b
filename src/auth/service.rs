// src/auth/service.rs
//! Account workflow component
//!
//! Registration, sign-in and password reset all follow the same shape:
//! stage a payload in the cache under a one-time code, mail the code, then
//! consume it atomically on verification.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::codes::{
    generate_unique_code, random_code, FORGOT_PASSWORD_CODE_RANGE, REGISTRATION_CODE_RANGE,
    SIGN_IN_CODE_RANGE,
};
use super::models::{PendingRegistration, PendingSession, TokenPair};
use super::password::{hash_password, verify_password};
use super::tokens::TokenIssuer;
use crate::cache::{keys, CacheClient};
use crate::common::config::WorkflowConfig;
use crate::common::{internal, safe_email_log, safe_token_log, ServiceError};
use crate::events::{CodeMailKind, EventBus};
use crate::users::models::{NewUser, User};
use crate::users::validators::{has_disallowed_characters, normalize_username};
use crate::users::{FullUser, PublicUser, StoreError, UserService, UserStore};

pub struct AuthService {
    store: Arc<dyn UserStore>,
    cache: CacheClient,
    events: EventBus,
    users: Arc<UserService>,
    tokens: Arc<TokenIssuer>,
    config: WorkflowConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: CacheClient,
        events: EventBus,
        users: Arc<UserService>,
        tokens: Arc<TokenIssuer>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            cache,
            events,
            users,
            tokens,
            config,
        }
    }

    // ============================================================================
    // Registration
    // ============================================================================

    /// Stage a registration and mail its code. Returns the code for callers
    /// that need to correlate it (tests, development tooling).
    pub async fn send_registration_code(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<u64, ServiceError> {
        let email = email.trim().to_string();
        let username = self.checked_username(username)?;

        let email_marker = keys::prepare_email_key(&email);
        let username_marker = keys::prepare_username_key(&username);

        if self.flag_set(&email_marker).await? {
            return Err(ServiceError::EmailAlreadyExists);
        }
        if self.flag_set(&username_marker).await? {
            return Err(ServiceError::UsernameAlreadyExists);
        }

        self.stage_registration(email, username, password).await
    }

    /// Same as [`send_registration_code`](Self::send_registration_code) but
    /// skips the in-progress markers, which the first attempt set.
    pub async fn resend_registration_code(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<u64, ServiceError> {
        let email = email.trim().to_string();
        let username = self.checked_username(username)?;

        self.stage_registration(email, username, password).await
    }

    async fn stage_registration(
        &self,
        email: String,
        username: String,
        password: &str,
    ) -> Result<u64, ServiceError> {
        self.ensure_not_registered(&email, &username).await?;

        let password_hash = hash_password(password, self.config.bcrypt_cost)
            .await
            .map_err(internal("Failed to hash password"))?;

        let pending = PendingRegistration {
            email: email.clone(),
            username: username.clone(),
            password_hash,
        };
        let code = generate_unique_code(
            &self.cache,
            keys::registration_code_key,
            || random_code(&REGISTRATION_CODE_RANGE),
            self.config.code_attempts,
            &pending,
            self.config.registration_code_ttl,
        )
        .await?;

        for marker in [
            keys::prepare_email_key(&email),
            keys::prepare_username_key(&username),
        ] {
            self.cache
                .set_flag(&marker, self.config.registration_marker_ttl)
                .await
                .map_err(internal("Failed to set registration marker"))?;
        }

        self.events
            .code_mail(CodeMailKind::Registration, &email, code)
            .await
            .map_err(internal("Failed to publish registration code mail"))?;

        info!(email = %safe_email_log(&email), username = %username, "Registration code sent");
        Ok(code)
    }

    /// Consume a registration code, create the account and sign it in
    pub async fn verify_registration_code(
        &self,
        code: u64,
    ) -> Result<(PublicUser, TokenPair), ServiceError> {
        let key = keys::registration_code_key(code);
        let pending: PendingRegistration = self
            .cache
            .take_json(&key)
            .await
            .map_err(internal("Failed to consume registration code"))?
            .ok_or(ServiceError::InvalidCode)?;

        let created = self
            .store
            .create_user(NewUser {
                email: pending.email.clone(),
                username: pending.username.clone(),
                password_hash: pending.password_hash.clone(),
            })
            .await;

        let user = match created {
            Ok(user) => user,
            Err(StoreError::UniqueViolation) => {
                warn!(username = %pending.username, "Registration lost a uniqueness race");
                return Err(self.which_conflict(&pending.email).await);
            }
            Err(e) => {
                error!(error = %e, username = %pending.username, "Failed to create user");
                self.restage(&key, &pending, self.config.registration_code_ttl)
                    .await;
                return Err(ServiceError::Internal);
            }
        };

        let tokens = self.issue_tokens(&user)?;

        if let Err(e) = self
            .cache
            .delete(&[
                keys::prepare_email_key(&pending.email),
                keys::prepare_username_key(&pending.username),
            ])
            .await
        {
            warn!(error = %e, user_id = %user.id, "Failed to clear registration markers");
        }

        if let Err(e) = self.events.user_created(&user.id, &user.username).await {
            error!(error = %e, user_id = %user.id, "Failed to publish user created event");
        }

        info!(user_id = %user.id, username = %user.username, "User registered");
        let user = FullUser::from_user(user, Vec::new());
        Ok((PublicUser::from(user), tokens))
    }

    // ============================================================================
    // Sign-in
    // ============================================================================

    /// Check credentials and mail a sign-in code
    pub async fn send_sign_in_code(
        &self,
        email_or_username: &str,
        password: &str,
    ) -> Result<u64, ServiceError> {
        let login = email_or_username.trim();
        let user = self
            .store
            .find_by_email_or_username(login)
            .await
            .map_err(internal("Failed to look up user for sign-in"))?
            .ok_or(ServiceError::InvalidCredentials)?;

        let matches = verify_password(password, &user.password_hash)
            .await
            .map_err(internal("Failed to verify password"))?;
        if !matches {
            warn!(user_id = %user.id, "Sign-in rejected: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        let session = PendingSession {
            user_id: user.id.clone(),
            username: user.username.clone(),
        };
        let code = generate_unique_code(
            &self.cache,
            keys::sign_in_code_key,
            || random_code(&SIGN_IN_CODE_RANGE),
            self.config.code_attempts,
            &session,
            self.config.sign_in_code_ttl,
        )
        .await?;

        self.events
            .code_mail(CodeMailKind::SignIn, &user.email, code)
            .await
            .map_err(internal("Failed to publish sign-in code mail"))?;

        info!(user_id = %user.id, "Sign-in code sent");
        Ok(code)
    }

    pub async fn verify_sign_in_code(
        &self,
        code: u64,
    ) -> Result<(PublicUser, TokenPair), ServiceError> {
        let key = keys::sign_in_code_key(code);
        let session: PendingSession = self
            .cache
            .take_json(&key)
            .await
            .map_err(internal("Failed to consume sign-in code"))?
            .ok_or(ServiceError::InvalidCode)?;

        let user = match self.users.find_by_id(&session.user_id).await {
            Ok(user) => user,
            Err(ServiceError::UserNotFound) => return Err(ServiceError::InvalidCode),
            Err(e) => {
                self.restage(&key, &session, self.config.sign_in_code_ttl)
                    .await;
                return Err(e);
            }
        };

        let tokens = self
            .tokens
            .issue(&user.id, user.role)
            .map_err(internal("Failed to issue tokens"))?;

        info!(user_id = %user.id, "User signed in");
        Ok((PublicUser::from(user), tokens))
    }

    // ============================================================================
    // Tokens
    // ============================================================================

    /// Trade a refresh token for a fresh pair. Every failure is `Unauthorized`
    /// except an infrastructure error while reloading the user.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.tokens.decode_refresh(refresh_token).map_err(|e| {
            warn!(error = %e, token = %safe_token_log(refresh_token), "Refresh token rejected");
            ServiceError::Unauthorized
        })?;

        let user = match self.users.find_by_id(&claims.id).await {
            Ok(user) => user,
            Err(ServiceError::UserNotFound) => {
                warn!(user_id = %claims.id, "Refresh token for a missing user");
                return Err(ServiceError::Unauthorized);
            }
            Err(e) => return Err(e),
        };

        self.tokens
            .issue(&user.id, user.role)
            .map_err(internal("Failed to issue tokens"))
    }

    // ============================================================================
    // Passwords
    // ============================================================================

    pub async fn update_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(internal("Failed to load user for password update"))?
            .ok_or(ServiceError::UserNotFound)?;

        let matches = verify_password(old_password, &user.password_hash)
            .await
            .map_err(internal("Failed to verify password"))?;
        if !matches {
            return Err(ServiceError::InvalidOldPassword);
        }

        self.store_password(&user.id, new_password).await?;
        info!(user_id = %user.id, "Password updated");
        Ok(())
    }

    /// Mail a reset code. An unknown email succeeds silently.
    pub async fn request_forgot_password_code(&self, email: &str) -> Result<(), ServiceError> {
        let email = email.trim();
        let user = match self
            .store
            .find_by_email(email)
            .await
            .map_err(internal("Failed to look up user for password reset"))?
        {
            Some(user) => user,
            None => {
                info!(email = %safe_email_log(email), "Password reset requested for unknown email");
                return Ok(());
            }
        };

        let session = PendingSession {
            user_id: user.id.clone(),
            username: user.username.clone(),
        };
        let code = generate_unique_code(
            &self.cache,
            keys::forgot_password_code_key,
            || random_code(&FORGOT_PASSWORD_CODE_RANGE),
            self.config.code_attempts,
            &session,
            self.config.forgot_password_code_ttl,
        )
        .await?;

        self.events
            .code_mail(CodeMailKind::ForgotPassword, &user.email, code)
            .await
            .map_err(internal("Failed to publish forgot password mail"))?;

        info!(user_id = %user.id, "Password reset code sent");
        Ok(())
    }

    pub async fn change_forgotten_password(
        &self,
        code: u64,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let key = keys::forgot_password_code_key(code);
        let session: PendingSession = self
            .cache
            .take_json(&key)
            .await
            .map_err(internal("Failed to consume password reset code"))?
            .ok_or(ServiceError::InvalidForgotPasswordCode)?;

        match self.store_password(&session.user_id, new_password).await {
            Ok(()) => {
                info!(user_id = %session.user_id, "Password reset");
                Ok(())
            }
            Err(e) => {
                self.restage(&key, &session, self.config.forgot_password_code_ttl)
                    .await;
                Err(e)
            }
        }
    }

    // ============================================================================
    // Helpers
    // ============================================================================

    fn checked_username(&self, username: &str) -> Result<String, ServiceError> {
        let username = normalize_username(username);
        if has_disallowed_characters(&username) {
            return Err(ServiceError::UsernameCannotContainSpecialCharacters);
        }
        Ok(username)
    }

    async fn flag_set(&self, key: &str) -> Result<bool, ServiceError> {
        self.cache
            .exists(key)
            .await
            .map_err(internal("Failed to check registration marker"))
    }

    async fn ensure_not_registered(&self, email: &str, username: &str) -> Result<(), ServiceError> {
        let email_taken = self
            .store
            .exists_with_email(email)
            .await
            .map_err(internal("Failed to check email uniqueness"))?;
        if email_taken {
            return Err(ServiceError::EmailAlreadyExists);
        }

        let username_taken = self
            .store
            .exists_with_username(username)
            .await
            .map_err(internal("Failed to check username uniqueness"))?;
        if username_taken {
            return Err(ServiceError::UsernameAlreadyExists);
        }

        Ok(())
    }

    async fn which_conflict(&self, email: &str) -> ServiceError {
        match self.store.exists_with_email(email).await {
            Ok(true) => ServiceError::EmailAlreadyExists,
            Ok(false) => ServiceError::UsernameAlreadyExists,
            Err(e) => {
                error!(error = %e, "Failed to classify uniqueness conflict");
                ServiceError::Internal
            }
        }
    }

    fn issue_tokens(&self, user: &User) -> Result<TokenPair, ServiceError> {
        self.tokens
            .issue(&user.id, user.role)
            .map_err(internal("Failed to issue tokens"))
    }

    async fn store_password(&self, user_id: &str, password: &str) -> Result<(), ServiceError> {
        let password_hash = hash_password(password, self.config.bcrypt_cost)
            .await
            .map_err(internal("Failed to hash password"))?;

        self.store
            .update_password_hash(user_id, &password_hash)
            .await
            .map_err(internal("Failed to store password hash"))
    }

    /// Put a consumed payload back after the step that followed failed
    async fn restage<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            error!(error = %e, key = %key, "Failed to re-stage consumed code");
        }
    }
}
