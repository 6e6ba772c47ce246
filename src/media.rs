//! # Media Storage
//!
//! Image uploads for page content. Objects are addressed by a key of the form
//! `{tenantId}/{unixMillis}-{8 hex}-{name}.{ext}`; the leading tenant segment
//! is what ties an object to its owner.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use metrics::counter;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::{ApiError, field_error, not_found, upstream_error};
use crate::slug::fold_char;

/// Accepted content types and the extension stored for each.
pub const ALLOWED_CONTENT_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("No file provided")]
    Missing,
    #[error("Invalid file type. Allowed: JPEG, PNG, GIF, WebP")]
    UnsupportedType(String),
    #[error("File too large. Maximum size is {max_bytes} bytes")]
    TooLarge { max_bytes: usize },
    #[error("File not found")]
    NotOwned,
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<MediaError> for ApiError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::Missing | MediaError::UnsupportedType(_) | MediaError::TooLarge { .. } => {
                field_error("file", &error.to_string())
            }
            MediaError::NotOwned => not_found("File not found"),
            MediaError::Storage(e) => {
                tracing::error!(error = %e, "Media storage failure");
                upstream_error("Upload failed")
            }
        }
    }
}

/// A stored object as reported to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub url: String,
    pub key: String,
    pub size: usize,
    pub content_type: String,
}

/// Durable object storage with public URLs.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), MediaError>;

    /// Deleting an absent object succeeds.
    async fn delete(&self, key: &str) -> Result<(), MediaError>;

    fn public_url(&self, key: &str) -> String;

    /// Inverse of [`MediaStore::public_url`].
    fn key_for_url(&self, url: &str) -> Option<String> {
        let base = self.public_url("");
        url.strip_prefix(&base)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

/// Stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemMediaStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.root.clone(), &config.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MediaError> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !is_plain {
            return Err(MediaError::NotOwned);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for FilesystemMediaStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), MediaError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MediaError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// Stored extension for an accepted content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(allowed, _)| allowed.eq_ignore_ascii_case(content_type))
        .map(|(_, extension)| *extension)
}

/// File name stem reduced to lowercase ASCII, hyphen-separated, at most 50
/// characters. Falls back to `file`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };

    let mut sanitized = String::with_capacity(stem.len());
    for ch in stem.chars().flat_map(char::to_lowercase) {
        for c in fold_char(ch).chars() {
            if c.is_ascii_alphanumeric() || c == '_' {
                sanitized.push(c);
            } else if !sanitized.ends_with('-') && !sanitized.is_empty() {
                sanitized.push('-');
            }
        }
    }

    let trimmed: String = sanitized.trim_end_matches('-').chars().take(MAX_NAME_LEN).collect();
    let trimmed = trimmed.trim_end_matches('-');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Object key for a new upload.
pub fn object_key(tenant_id: Uuid, file_name: &str, extension: &str, unix_millis: i64) -> String {
    let suffix: u32 = rand::thread_rng().r#gen();
    format!(
        "{tenant_id}/{unix_millis}-{suffix:08x}-{}.{extension}",
        sanitize_file_name(file_name)
    )
}

/// Validates and stores uploads for tenants.
#[derive(Clone)]
pub struct MediaService {
    store: Arc<dyn MediaStore>,
    max_upload_bytes: usize,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStore>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn upload(
        &self,
        tenant_id: Uuid,
        file_name: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<StoredObject, MediaError> {
        if body.is_empty() {
            return Err(MediaError::Missing);
        }
        let extension = extension_for(content_type)
            .ok_or_else(|| MediaError::UnsupportedType(content_type.to_string()))?;
        if body.len() > self.max_upload_bytes {
            return Err(MediaError::TooLarge {
                max_bytes: self.max_upload_bytes,
            });
        }

        let key = object_key(tenant_id, file_name, extension, Utc::now().timestamp_millis());
        let size = body.len();
        self.store.put(&key, body, content_type).await?;

        counter!("cms_media_uploads_total").increment(1);
        tracing::info!(%tenant_id, %key, size, "Media uploaded");

        Ok(StoredObject {
            url: self.store.public_url(&key),
            key,
            size,
            content_type: content_type.to_ascii_lowercase(),
        })
    }

    /// Delete the object behind `url`, which must belong to `tenant_id`.
    pub async fn remove(&self, tenant_id: Uuid, url: &str) -> Result<(), MediaError> {
        let key = self.store.key_for_url(url).ok_or(MediaError::NotOwned)?;
        let owner = format!("{tenant_id}/");
        if !key.starts_with(&owner) {
            tracing::warn!(%tenant_id, %key, "Refusing to delete media of another tenant");
            return Err(MediaError::NotOwned);
        }

        self.store.delete(&key).await?;
        tracing::info!(%tenant_id, %key, "Media deleted");
        Ok(())
    }
}
