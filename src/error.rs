use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::{BlobError, StoreError};
use crate::service::images::ImageError;

/// 对外 (HTTP) 统一错误类型
///
/// 响应体固定为 `{"error": {"message": "...", "details": "..."}}`,
/// `details` 只在存储类错误时出现。
#[derive(Error, Debug)]
pub enum AppError {
    /// 请求参数不合法, HTTP 400
    #[error("{0}")]
    Validation(String),

    /// 资源不存在, HTTP 404
    #[error("{0}")]
    NotFound(String),

    /// 底层数据库 / 对象存储失败, HTTP 500
    #[error("{message}")]
    Storage { message: String, details: String },
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Storage { message, details } => {
                tracing::error!("{}: {}", message, details);
                json!({ "error": { "message": message, "details": details } })
            }
            other => json!({ "error": { "message": other.to_string() } }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::Blob(e) => e.into(),
            other => AppError::Storage {
                message: "Storage error".to_string(),
                details: other.to_string(),
            },
        }
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidKey(_) => AppError::Validation(err.to_string()),
            other => AppError::Storage {
                message: "Blob storage error".to_string(),
                details: other.to_string(),
            },
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::InvalidUrl(_) => AppError::Validation("Invalid or missing image URL".to_string()),
            ImageError::NotFound(url) => AppError::NotFound(format!("Image not found: {}", url)),
            ImageError::Blob(e) => e.into(),
        }
    }
}

/// 给存储错误换上接口级别的提示语, 校验 / 404 错误原样透传
pub trait ResultExt<T> {
    fn or_fail(self, message: &str) -> Result<T, AppError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn or_fail(self, message: &str) -> Result<T, AppError> {
        self.map_err(|e| match e.into() {
            AppError::Storage { details, .. } => AppError::Storage {
                message: message.to_string(),
                details,
            },
            other => other,
        })
    }
}
