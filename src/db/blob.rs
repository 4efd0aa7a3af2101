use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob io error: {0}")]
    Io(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob key: {0}")]
    InvalidKey(String),
}

/// 对象存储抽象: 超大报价单 JSON 与图片都放在这里
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError>;

    /// 不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// 删除, 返回对象是否存在过
    async fn delete(&self, key: &str) -> Result<bool, BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
}

/// key 形如 `quotations/Q-00001.json`: 相对路径, 不允许 `.` / `..` / 空段
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    let bad_segment = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad_segment {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// 内存对象存储 (开发 / 测试用)
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        validate_key(key)?;
        self.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        validate_key(key)?;
        Ok(self.objects.get(key).map(|data| data.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        validate_key(key)?;
        Ok(self.objects.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        validate_key(key)?;
        Ok(self.objects.contains_key(key))
    }
}

/// 本地文件系统对象存储
///
/// key 直接映射为 `base_dir` 下的相对路径, `put` 时自动创建父目录。
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    pub async fn open(base_dir: impl AsRef<Path>) -> Result<Self, BlobError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Self { base_dir })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        let relative = Path::new(key);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Io(e.to_string()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))
    }
}
