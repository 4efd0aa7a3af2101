use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{json, Value};

use super::AppState;
use crate::error::AppError;
use crate::models::{DiamondPayload, DiamondVariant, MetalPriceTable};
use crate::service::{DiamondUpdateOutcome, PriceUpdateOutcome};

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 请求体解析失败统一按 400 返回
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// 查询参数解析失败同样按 400 返回
pub(crate) fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// 路径中的钻石 id 不是数字时视为不存在
fn diamond_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::not_found("Diamond not found"))
}

pub async fn list_diamonds(State(state): State<AppState>) -> Result<Json<Vec<DiamondVariant>>, AppError> {
    Ok(Json(state.catalog.list_diamonds().await?))
}

pub async fn create_diamond(
    State(state): State<AppState>,
    payload: Result<Json<DiamondPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let variant = state.catalog.create_diamond(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

/// 更新目录条目并联动报价单
pub async fn update_diamond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DiamondPayload>, JsonRejection>,
) -> Result<Json<DiamondUpdateOutcome>, AppError> {
    let id = diamond_id(&id)?;
    let outcome = state.catalog.update_diamond(id, body(payload)?).await?;
    Ok(Json(outcome))
}

pub async fn delete_diamond(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.catalog.delete_diamond(diamond_id(&id)?).await?;
    Ok(Json(json!({ "message": "Diamond deleted successfully" })))
}

pub async fn get_prices(State(state): State<AppState>) -> Result<Json<MetalPriceTable>, AppError> {
    Ok(Json(state.catalog.current_prices().await?))
}

/// 整表替换金属价格并联动报价单
pub async fn update_prices(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PriceUpdateOutcome>, AppError> {
    let outcome = state.catalog.update_prices(body(payload)?).await?;
    Ok(Json(outcome))
}
