use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::db::quotations::DEFAULT_INLINE_LIMIT_BYTES;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub images: ImagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: DocumentBackend,
    pub blob_backend: BlobBackend,
    pub blob_dir: String,
    /// 报价单序列化后超过该字节数则整单写入对象存储
    pub inline_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub public_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/jewel_quote".to_string(),
                max_connections: 10,
            },
            storage: StorageConfig {
                backend: DocumentBackend::Memory,
                blob_backend: BlobBackend::Memory,
                blob_dir: "data/blobs".to_string(),
                inline_limit_bytes: DEFAULT_INLINE_LIMIT_BYTES,
            },
            images: ImagesConfig {
                public_base_url: "/api/images".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 加载配置, 后者覆盖前者:
    /// 默认值 -> `quote.toml` (或 `QUOTE_CONFIG` 指定的文件) -> `QUOTE__SECTION__KEY`
    /// -> `SERVER_HOST` / `SERVER_PORT` / `DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("QUOTE_CONFIG").unwrap_or_else(|_| "quote.toml".to_string());
        Self::from_sources(&path, false)
    }

    /// 从指定文件加载 (文件必须存在), 环境变量仍然生效
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::from_sources(path, true)
    }

    fn from_sources(path: &str, required: bool) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&AppConfig::default())?;

        Config::builder()
            .add_source(defaults)
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix("QUOTE")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
    }
}
