//! Tests for auth module
//!
//! These tests drive the account workflow end to end against in-memory
//! SQLite, cache and publisher.

#[cfg(test)]
mod tests {
    use crate::cache::keys;
    use crate::common::ServiceError;
    use crate::events::{
        FORGOT_PASSWORD_MAIL_QUEUE, REGISTRATION_CODE_MAIL_QUEUE, SIGN_IN_CODE_MAIL_QUEUE,
        USERS_CREATED_EXCHANGE,
    };
    use crate::testing::{TestApp, TEST_PASSWORD};
    use crate::users::Role;

    #[tokio::test]
    async fn test_register_verify_scenario() {
        let app = TestApp::new().await;

        let code = app
            .auth
            .send_registration_code("a@x.com", "bob", "longenough1")
            .await
            .unwrap();

        let mails = app.publisher.published_to(REGISTRATION_CODE_MAIL_QUEUE).await;
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0]["email"], "a@x.com");
        assert_eq!(mails[0]["code"], code);

        let (user, tokens) = app.auth.verify_registration_code(code).await.unwrap();
        assert_eq!(user.username, "bob");
        assert!(!tokens.access_token.is_empty());

        let claims = app.tokens.decode_access(&tokens.access_token).unwrap();
        assert_eq!(claims.id, user.id);
        assert_eq!(claims.role, Role::User);

        let stored = app.users.find_by_id(&user.id).await.unwrap();
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(stored.username, "bob");

        let created = app.publisher.published_to(USERS_CREATED_EXCHANGE).await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["id"], user.id.as_str());

        // Markers are cleared once the account exists
        assert!(!app.cache.exists(&keys::prepare_email_key("a@x.com")).await.unwrap());
        assert!(!app.cache.exists(&keys::prepare_username_key("bob")).await.unwrap());
    }

    #[tokio::test]
    async fn test_username_is_normalized() {
        let app = TestApp::new().await;

        let code = app
            .auth
            .send_registration_code(" a@x.com ", "  BoB ", TEST_PASSWORD)
            .await
            .unwrap();
        let (user, _) = app.auth.verify_registration_code(code).await.unwrap();

        assert_eq!(user.username, "bob");
    }

    #[tokio::test]
    async fn test_disallowed_username_leaves_no_state() {
        let app = TestApp::new().await;

        for username in ["bo b", "bob!", "b@b", "bo-b", "bob№"] {
            let err = app
                .auth
                .send_registration_code("a@x.com", username, TEST_PASSWORD)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ServiceError::UsernameCannotContainSpecialCharacters
            ));
        }

        assert!(!app.cache.exists(&keys::prepare_email_key("a@x.com")).await.unwrap());
        assert!(app.publisher.published().await.is_empty());
        assert_eq!(app.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_code_is_rejected_without_store_writes() {
        let app = TestApp::new().await;

        let err = app.auth.verify_registration_code(123_456).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidCode));
        assert_eq!(app.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let app = TestApp::new().await;
        let code = app
            .auth
            .send_registration_code("a@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap();

        app.auth.verify_registration_code(code).await.unwrap();
        let err = app.auth.verify_registration_code(code).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidCode));
        assert_eq!(app.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_registration_in_progress_blocks_duplicates() {
        let app = TestApp::new().await;
        app.auth
            .send_registration_code("a@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap();

        let err = app
            .auth
            .send_registration_code("a@x.com", "alice", TEST_PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyExists));

        let err = app
            .auth
            .send_registration_code("other@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UsernameAlreadyExists));

        // Resend ignores the markers and stages a new code
        let code = app
            .auth
            .resend_registration_code("a@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap();
        let (user, _) = app.auth.verify_registration_code(code).await.unwrap();
        assert_eq!(user.username, "bob");
    }

    #[tokio::test]
    async fn test_existing_account_blocks_registration() {
        let app = TestApp::new().await;
        app.create_user("bob").await;

        let err = app
            .auth
            .send_registration_code("new@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UsernameAlreadyExists));

        let err = app
            .auth
            .resend_registration_code("bob@x.com", "robert", TEST_PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn test_failed_mail_publish_is_internal() {
        let app = TestApp::new().await;
        app.publisher.set_failing(true);

        let err = app
            .auth
            .send_registration_code("a@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Internal));
    }

    #[tokio::test]
    async fn test_sign_in_by_code() {
        let app = TestApp::new().await;
        let user = app.create_user("bob").await;

        let err = app
            .auth
            .send_sign_in_code("bob", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let err = app
            .auth
            .send_sign_in_code("nobody", TEST_PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let code = app
            .auth
            .send_sign_in_code("bob@x.com", TEST_PASSWORD)
            .await
            .unwrap();
        let mails = app.publisher.published_to(SIGN_IN_CODE_MAIL_QUEUE).await;
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0]["email"], "bob@x.com");

        let (signed_in, tokens) = app.auth.verify_sign_in_code(code).await.unwrap();
        assert_eq!(signed_in.id, user.id);
        assert_eq!(app.tokens.decode_access(&tokens.access_token).unwrap().id, user.id);

        let err = app.auth.verify_sign_in_code(code).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCode));
    }

    #[tokio::test]
    async fn test_refresh_tokens() {
        let app = TestApp::new().await;
        let user = app.create_user("bob").await;
        let pair = app.tokens.issue(&user.id, Role::User).unwrap();

        let fresh = app.auth.refresh_tokens(&pair.refresh_token).await.unwrap();
        assert_eq!(app.tokens.decode_refresh(&fresh.refresh_token).unwrap().id, user.id);
        assert_eq!(app.tokens.decode_access(&fresh.access_token).unwrap().id, user.id);

        for bad in ["garbage", pair.access_token.as_str()] {
            let err = app.auth.refresh_tokens(bad).await.unwrap_err();
            assert!(matches!(err, ServiceError::Unauthorized));
        }
    }

    #[tokio::test]
    async fn test_refresh_for_missing_user_is_unauthorized() {
        let app = TestApp::new().await;
        let pair = app.tokens.issue("no-such-user", Role::User).unwrap();

        let err = app.auth.refresh_tokens(&pair.refresh_token).await.unwrap_err();

        assert!(matches!(err, ServiceError::Unauthorized));
    }

    #[tokio::test]
    async fn test_update_password() {
        let app = TestApp::new().await;
        let user = app.create_user("bob").await;

        let err = app
            .auth
            .update_password(&user.id, "not-the-password", "brand-new-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOldPassword));

        app.auth
            .update_password(&user.id, TEST_PASSWORD, "brand-new-pass")
            .await
            .unwrap();

        assert!(app.auth.send_sign_in_code("bob", "brand-new-pass").await.is_ok());
        assert!(matches!(
            app.auth.send_sign_in_code("bob", TEST_PASSWORD).await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_forgot_password_for_unknown_email_is_silent() {
        let app = TestApp::new().await;

        app.auth
            .request_forgot_password_code("ghost@x.com")
            .await
            .unwrap();

        assert!(app.publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_forgot_password_reset() {
        let app = TestApp::new().await;
        app.create_user("bob").await;

        app.auth
            .request_forgot_password_code("bob@x.com")
            .await
            .unwrap();

        let mails = app.publisher.published_to(FORGOT_PASSWORD_MAIL_QUEUE).await;
        assert_eq!(mails.len(), 1);
        let code = mails[0]["code"].as_u64().unwrap();
        assert!(code >= 1_000_000_000);

        app.auth
            .change_forgotten_password(code, "reset-password-1")
            .await
            .unwrap();
        assert!(app.auth.send_sign_in_code("bob", "reset-password-1").await.is_ok());

        let err = app
            .auth
            .change_forgotten_password(code, "another-one-22")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidForgotPasswordCode));
    }

    // ============================================================================
    // Internal failures keep the code usable
    // ============================================================================

    #[tokio::test]
    async fn test_registration_code_survives_store_failure() {
        let app = TestApp::new().await;
        let code = app
            .auth
            .send_registration_code("a@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap();

        app.drop_table("users").await;

        let err = app.auth.verify_registration_code(code).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal));
        assert!(app
            .cache
            .exists(&keys::registration_code_key(code))
            .await
            .unwrap());
        assert!(app.publisher.published_to(USERS_CREATED_EXCHANGE).await.is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_code_survives_store_failure() {
        let app = TestApp::new().await;
        app.create_user("bob").await;
        let code = app
            .auth
            .send_sign_in_code("bob", TEST_PASSWORD)
            .await
            .unwrap();

        app.drop_table("users").await;

        let err = app.auth.verify_sign_in_code(code).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal));
        assert!(app.cache.exists(&keys::sign_in_code_key(code)).await.unwrap());
    }

    #[tokio::test]
    async fn test_forgot_password_code_survives_store_failure() {
        let app = TestApp::new().await;
        app.create_user("bob").await;
        app.auth
            .request_forgot_password_code("bob@x.com")
            .await
            .unwrap();
        let mails = app.publisher.published_to(FORGOT_PASSWORD_MAIL_QUEUE).await;
        let code = mails[0]["code"].as_u64().unwrap();

        app.drop_table("users").await;

        let err = app
            .auth
            .change_forgotten_password(code, "reset-password-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Internal));
        assert!(app
            .cache
            .exists(&keys::forgot_password_code_key(code))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_registration_succeeds_when_created_event_fails() {
        let app = TestApp::new().await;
        let code = app
            .auth
            .send_registration_code("a@x.com", "bob", TEST_PASSWORD)
            .await
            .unwrap();

        app.publisher.set_failing(true);

        let (user, _) = app.auth.verify_registration_code(code).await.unwrap();
        assert_eq!(user.username, "bob");
        assert_eq!(app.user_count().await, 1);
    }
}
