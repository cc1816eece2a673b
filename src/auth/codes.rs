//! One-time code generation
//!
//! Codes are drawn uniformly from a fixed range and claimed in the cache
//! with a set-if-absent write, so two callers never stage under one code.
//! The keyspace is never scanned.

use rand::Rng;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::warn;

use crate::cache::CacheClient;
use crate::common::ServiceError;

pub const REGISTRATION_CODE_RANGE: RangeInclusive<u64> = 100_000..=999_999;
pub const SIGN_IN_CODE_RANGE: RangeInclusive<u64> = 100_000..=999_999;
pub const FORGOT_PASSWORD_CODE_RANGE: RangeInclusive<u64> = 1_000_000_000..=9_999_999_999;

pub fn random_code(range: &RangeInclusive<u64>) -> u64 {
    rand::thread_rng().gen_range(range.clone())
}

/// Draw codes until one whose `key_for(code)` slot is free, and stage
/// `payload` there for `ttl` in the same write.
///
/// Exhausting `attempts` yields `TryAgainLater`; a cache failure is `Internal`.
pub async fn generate_unique_code<K, D, T>(
    cache: &CacheClient,
    key_for: K,
    mut draw: D,
    attempts: u32,
    payload: &T,
    ttl: Duration,
) -> Result<u64, ServiceError>
where
    K: Fn(u64) -> String,
    D: FnMut() -> u64,
    T: Serialize + ?Sized,
{
    for _ in 0..attempts {
        let code = draw();
        let claimed = cache
            .set_json_if_absent(&key_for(code), payload, ttl)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to claim code in cache");
                ServiceError::Internal
            })?;
        if claimed {
            return Ok(code);
        }
    }

    warn!(attempts = attempts, "Code generation exhausted its attempts");
    Err(ServiceError::TryAgainLater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::PendingSession;
    use crate::cache::{keys, MemoryCache};
    use futures::future::join_all;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    fn cache() -> CacheClient {
        CacheClient::new(Arc::new(MemoryCache::new()))
    }

    #[test]
    fn test_random_code_stays_in_range() {
        for _ in 0..1000 {
            assert!(REGISTRATION_CODE_RANGE.contains(&random_code(&REGISTRATION_CODE_RANGE)));
            assert!(FORGOT_PASSWORD_CODE_RANGE
                .contains(&random_code(&FORGOT_PASSWORD_CODE_RANGE)));
        }
    }

    fn session(user_id: &str) -> PendingSession {
        PendingSession {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_skips_codes_in_use() {
        let cache = cache();
        cache
            .set_flag(&keys::registration_code_key(111_111), TTL)
            .await
            .unwrap();

        let mut draws = vec![111_111, 222_222];
        let code = generate_unique_code(
            &cache,
            keys::registration_code_key,
            || draws.remove(0),
            10,
            &session("u1"),
            TTL,
        )
        .await
        .unwrap();

        assert_eq!(code, 222_222);
        let staged: Option<PendingSession> = cache
            .get_json(&keys::registration_code_key(222_222))
            .await
            .unwrap();
        assert_eq!(staged.map(|s| s.user_id).as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_share_a_code() {
        let cache = cache();
        let payloads = [session("u1"), session("u2")];

        // Both callers draw 333_333 first
        let results = join_all(payloads.iter().map(|payload| {
            let mut draws = vec![333_333, 444_444];
            let cache = cache.clone();
            async move {
                generate_unique_code(
                    &cache,
                    keys::sign_in_code_key,
                    move || draws.remove(0),
                    2,
                    payload,
                    TTL,
                )
                .await
            }
        }))
        .await;

        let mut codes: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        codes.sort();
        assert_eq!(codes, vec![333_333, 444_444]);

        let mut owners = Vec::new();
        for code in codes {
            let staged: PendingSession = cache
                .get_json(&keys::sign_in_code_key(code))
                .await
                .unwrap()
                .unwrap();
            owners.push(staged.user_id);
        }
        owners.sort();
        assert_eq!(owners, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let cache = cache();
        cache
            .set_flag(&keys::sign_in_code_key(123_456), TTL)
            .await
            .unwrap();

        let mut calls = 0;
        let result = generate_unique_code(
            &cache,
            keys::sign_in_code_key,
            || {
                calls += 1;
                123_456
            },
            10,
            &session("u1"),
            TTL,
        )
        .await;

        assert!(matches!(result, Err(ServiceError::TryAgainLater)));
        assert_eq!(calls, 10);
    }
}
