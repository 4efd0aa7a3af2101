use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::db::blob::{validate_key, BlobError, BlobStore};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("invalid image url: {0}")]
    InvalidUrl(String),

    #[error("image not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// 图片托管
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// 上传, 返回可公开访问的 URL
    async fn upload(&self, name: &str, data: Vec<u8>) -> Result<String, ImageError>;

    /// 按 URL 中 base 之后的路径读取
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ImageError>;

    async fn delete(&self, url: &str) -> Result<(), ImageError>;
}

const IMAGE_PREFIX: &str = "images";

/// 图片存在对象存储的 `images/` 下, URL 为 `{public_base_url}/{文件名}`
pub struct BlobImageHost {
    blobs: Arc<dyn BlobStore>,
    public_base_url: String,
}

impl BlobImageHost {
    pub fn new(blobs: Arc<dyn BlobStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            blobs,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn key_for(path: &str) -> Result<String, ImageError> {
        let key = format!("{}/{}", IMAGE_PREFIX, path);
        validate_key(&key).map_err(|_| ImageError::InvalidUrl(path.to_string()))?;
        Ok(key)
    }

    /// URL -> 对象 key, 不在本服务 base 之下的 URL 一律拒绝
    pub fn key_from_url(&self, url: &str) -> Result<String, ImageError> {
        let path = url
            .trim()
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| ImageError::InvalidUrl(url.to_string()))?;
        Self::key_for(path)
    }
}

/// 文件名只保留字母数字和 `._-`, 其余替换为 `_`
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl ImageHost for BlobImageHost {
    async fn upload(&self, name: &str, data: Vec<u8>) -> Result<String, ImageError> {
        let file_name = format!("{}_{}", Utc::now().timestamp_millis(), sanitize_file_name(name));
        let key = Self::key_for(&file_name)?;
        let size = data.len();
        self.blobs.put(&key, data).await?;
        tracing::info!("Image uploaded: {} ({} bytes)", key, size);
        Ok(format!("{}/{}", self.public_base_url, file_name))
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ImageError> {
        let key = Self::key_for(path)?;
        self.blobs
            .get(&key)
            .await?
            .ok_or_else(|| ImageError::NotFound(path.to_string()))
    }

    async fn delete(&self, url: &str) -> Result<(), ImageError> {
        let key = self.key_from_url(url)?;
        if !self.blobs.delete(&key).await? {
            return Err(ImageError::NotFound(url.to_string()));
        }
        tracing::info!("Image deleted: {}", key);
        Ok(())
    }
}
