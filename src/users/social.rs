// src/users/social.rs
//! Social link classification and reachability probing

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::models::SocialPlatform;

/// Known URL prefixes. Matching picks the longest prefix that fits.
const PLATFORM_PREFIXES: &[(&str, SocialPlatform)] = &[
    ("https://youtube.com/", SocialPlatform::Youtube),
    ("https://www.youtube.com/", SocialPlatform::Youtube),
    ("https://youtu.be/", SocialPlatform::Youtube),
    ("https://tiktok.com/", SocialPlatform::Tiktok),
    ("https://www.tiktok.com/", SocialPlatform::Tiktok),
    ("https://github.com/", SocialPlatform::Github),
    ("https://t.me/", SocialPlatform::Telegram),
];

/// Resolve the platform a link belongs to, `None` for unknown hosts.
/// A bare prefix with nothing after it does not count as a profile link.
pub fn classify_link(url: &str) -> Option<SocialPlatform> {
    let url = url.trim();
    PLATFORM_PREFIXES
        .iter()
        .filter(|(prefix, _)| url.len() > prefix.len() && url.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, platform)| *platform)
}

#[derive(Debug, thiserror::Error)]
pub enum LinkProbeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),
}

/// Checks that a link answers before it is stored
#[async_trait]
pub trait LinkProber: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), LinkProbeError>;
}

pub struct HttpLinkProber {
    http: Client,
}

impl HttpLinkProber {
    /// `http` should carry the outbound timeout
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl LinkProber for HttpLinkProber {
    async fn probe(&self, url: &str) -> Result<(), LinkProbeError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        debug!(url = %url, http_status = %status, "Probed social link");

        if status.is_success() {
            Ok(())
        } else {
            Err(LinkProbeError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_hosts() {
        assert_eq!(
            classify_link("https://www.youtube.com/@bob"),
            Some(SocialPlatform::Youtube)
        );
        assert_eq!(classify_link("https://youtu.be/xyz"), Some(SocialPlatform::Youtube));
        assert_eq!(classify_link("https://github.com/bob"), Some(SocialPlatform::Github));
        assert_eq!(classify_link("https://t.me/bob"), Some(SocialPlatform::Telegram));
        assert_eq!(
            classify_link("https://www.tiktok.com/@bob"),
            Some(SocialPlatform::Tiktok)
        );
    }

    #[test]
    fn test_classify_rejects_unknown_and_bare_prefixes() {
        assert_eq!(classify_link("https://example.com/bob"), None);
        assert_eq!(classify_link("http://github.com/bob"), None);
        assert_eq!(classify_link("https://github.com/"), None);
        assert_eq!(classify_link("https://github.com.evil.io/bob"), None);
    }
}
