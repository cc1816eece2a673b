// src/users/avatar.rs
//! Avatar asset storage: local directory or the external CDN

use async_trait::async_trait;
use bytes::Bytes;
use infer::Infer;
use reqwest::{multipart, Client};
use std::path::PathBuf;
use tokio::fs as tokio_fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("avatar storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CDN request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("CDN rejected upload with status {status}: {details}")]
    Rejected { status: u16, details: String },
}

impl AvatarError {
    /// True when the external asset store is the one that failed
    pub fn is_upstream(&self) -> bool {
        matches!(self, AvatarError::Request(_) | AvatarError::Rejected { .. })
    }
}

#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store the image, returning the reference to persist on the user
    async fn upload(
        &self,
        user_id: &str,
        extension: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<String, AvatarError>;

    /// Drop an asset previously stored for `user_id`. References the store
    /// did not issue to that user are ignored.
    async fn remove(&self, user_id: &str, reference: &str) -> Result<(), AvatarError>;
}

// ============================================================================
// Local filesystem
// ============================================================================

pub struct LocalAvatarStore {
    dir: PathBuf,
    public_prefix: String,
}

impl LocalAvatarStore {
    pub fn new(dir: PathBuf, public_prefix: String) -> Self {
        Self { dir, public_prefix }
    }
}

#[async_trait]
impl AvatarStore for LocalAvatarStore {
    async fn upload(
        &self,
        user_id: &str,
        extension: &str,
        _file_name: &str,
        data: Bytes,
    ) -> Result<String, AvatarError> {
        tokio_fs::create_dir_all(&self.dir).await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let filename = format!("avatar_{}_{}.{}", user_id, &suffix[..8], extension);
        let file_path = self.dir.join(&filename);

        tokio_fs::write(&file_path, &data).await.map_err(|e| {
            error!(error = %e, file_path = %file_path.display(), "Failed to save avatar file");
            e
        })?;

        info!(user_id = %user_id, filename = %filename, "Avatar file saved successfully");

        Ok(format!("{}{}", self.public_prefix, filename))
    }

    async fn remove(&self, user_id: &str, reference: &str) -> Result<(), AvatarError> {
        let Some(filename) = reference.strip_prefix(&self.public_prefix) else {
            debug!(reference = %reference, "Avatar is not a local file, nothing to remove");
            return Ok(());
        };

        let filename = sanitize_filename(filename);
        if !filename.starts_with(&format!("avatar_{}_", user_id)) {
            warn!(user_id = %user_id, reference = %reference, "Refusing to remove an avatar owned by someone else");
            return Ok(());
        }

        let file_path = self.dir.join(filename);
        match tokio_fs::remove_file(&file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// CDN
// ============================================================================

/// Uploads to `<origin>/upload`. The CDN keys assets by path, so a new upload
/// for the same user replaces the previous one.
pub struct CdnAvatarStore {
    http: Client,
    origin: String,
}

impl CdnAvatarStore {
    pub fn new(http: Client, origin: String) -> Self {
        Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AvatarStore for CdnAvatarStore {
    async fn upload(
        &self,
        user_id: &str,
        _extension: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<String, AvatarError> {
        let endpoint = format!("{}/upload", self.origin);

        let part = multipart::Part::bytes(data.to_vec()).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("file", part)
            .text("path", format!("user-avatars/{}", user_id));

        let response = self
            .http
            .post(&endpoint)
            .header("type", "IMAGE")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let details = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("details").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(AvatarError::Rejected {
                status: status.as_u16(),
                details,
            });
        }

        info!(user_id = %user_id, "Avatar uploaded to CDN");
        Ok(body.trim().to_string())
    }

    async fn remove(&self, _user_id: &str, reference: &str) -> Result<(), AvatarError> {
        // The CDN has no delete endpoint; the next upload overwrites the path.
        debug!(reference = %reference, "Leaving CDN avatar in place");
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Magic-byte check; the declared content type is never trusted
pub fn is_valid_image_type(data: &[u8]) -> bool {
    let infer = Infer::new();
    if let Some(info) = infer.get(data) {
        matches!(
            info.mime_type(),
            "image/jpeg" | "image/jpg" | "image/png" | "image/gif" | "image/webp"
        )
    } else {
        false
    }
}

/// Lowercased extension if it is one we accept
pub fn image_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

pub fn sanitize_filename(filename: &str) -> String {
    // Remove path traversal sequences and directory separators
    let cleaned = filename
        .replace("..", "")
        .replace('/', "")
        .replace('\\', "")
        .replace('\0', "");

    let sanitized: String = cleaned
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-' || *c == '_')
        .take(255)
        .collect();

    if sanitized.is_empty() {
        "sanitized_file".to_string()
    } else {
        sanitized
    }
}
