//! JWT pair issuance and validation

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::models::{AccessClaims, RefreshClaims, TokenPair};
use crate::common::config::TokenConfig;
use crate::users::Role;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

/// Signs access tokens and refresh tokens with independent secrets
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    config: TokenConfig,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            config,
        }
    }

    pub fn refresh_ttl(&self) -> std::time::Duration {
        self.config.refresh_ttl
    }

    pub fn issue(&self, user_id: &str, role: Role) -> Result<TokenPair, TokenError> {
        let now = Utc::now().timestamp();
        let access_exp = now + self.config.access_ttl.as_secs() as i64;
        let refresh_exp = now + self.config.refresh_ttl.as_secs() as i64;

        let access = AccessClaims {
            id: user_id.to_string(),
            role,
            exp: access_exp as usize,
        };
        let refresh = RefreshClaims {
            id: user_id.to_string(),
            exp: refresh_exp as usize,
        };

        let header = Header::new(Algorithm::HS256);
        let access_token =
            encode(&header, &access, &self.access_encoding).map_err(TokenError::Sign)?;
        let refresh_token =
            encode(&header, &refresh, &self.refresh_encoding).map_err(TokenError::Sign)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_exp: access_exp,
            refresh_token_exp: refresh_exp,
        })
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.access_decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig {
            access_secret: "access".to_string(),
            refresh_secret: "refresh".to_string(),
            access_ttl: Duration::from_secs(60),
            refresh_ttl: Duration::from_secs(3600),
        })
    }

    #[test]
    fn test_pair_round_trip() {
        let issuer = issuer();
        let pair = issuer.issue("u1", Role::Admin).unwrap();

        let access = issuer.decode_access(&pair.access_token).unwrap();
        assert_eq!(access.id, "u1");
        assert_eq!(access.role, Role::Admin);

        let refresh = issuer.decode_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.id, "u1");
        assert!(pair.refresh_token_exp > pair.access_token_exp);
    }

    #[test]
    fn test_secrets_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer.issue("u1", Role::User).unwrap();

        assert!(issuer.decode_access(&pair.refresh_token).is_err());
        assert!(issuer.decode_refresh(&pair.access_token).is_err());
        assert!(issuer.decode_access("not.a.token").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = issuer();
        let claims = AccessClaims {
            id: "u1".to_string(),
            role: Role::User,
            exp: (Utc::now().timestamp() - 3600) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access"),
        )
        .unwrap();

        assert!(issuer.decode_access(&token).is_err());
    }
}
