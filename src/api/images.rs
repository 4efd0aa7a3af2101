use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Json, Multipart, Path, Query, Request, State,
    },
    http::{header, HeaderMap},
    response::IntoResponse,
};
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use super::handlers::{body, query};
use super::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub url: Option<String>,
}

fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        // svg 等可执行内容一律按二进制下发
        _ => "application/octet-stream",
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

/// 表单中 `images` 字段的全部文件
async fn multipart_files(mut multipart: Multipart) -> Result<Vec<(String, Bytes)>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        if !matches!(field.name(), Some("images") | Some("images[]")) {
            continue;
        }
        let name = field.file_name().unwrap_or("image").to_string();
        let data = field.bytes().await.map_err(|e| AppError::validation(e.body_text()))?;
        files.push((name, data));
    }
    Ok(files)
}

/// 支持两种上传方式: multipart 表单 (`images` 字段, 可多个文件),
/// 或原始请求体即图片内容, 文件名来自 `?name=`
pub async fn upload_image(
    State(state): State<AppState>,
    params: Result<Query<UploadQuery>, QueryRejection>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let params = query(params)?;
    let mut files = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        multipart_files(multipart).await?
    } else {
        let data = Bytes::from_request(request, &state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        vec![(params.name.unwrap_or_else(|| "image".to_string()), data)]
    };
    files.retain(|(_, data)| !data.is_empty());
    if files.is_empty() {
        return Err(AppError::validation("No images provided"));
    }

    let urls = try_join_all(
        files
            .iter()
            .map(|(name, data)| state.images.upload(name, data.to_vec())),
    )
    .await?;
    tracing::info!("Uploaded {} image(s)", urls.len());
    Ok(Json(json!({ "imageUrls": urls })))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.images.fetch(&key).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&key))], data))
}

pub async fn delete_image(
    State(state): State<AppState>,
    payload: Result<Json<DeleteImageRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let url = body(payload)?
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::validation("Invalid or missing image URL"))?;
    state.images.delete(&url).await?;
    Ok(Json(json!({ "message": "Image deleted successfully" })))
}
