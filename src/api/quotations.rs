use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::header,
    response::IntoResponse,
};
use serde_json::{json, Value};

use super::handlers::{body, query};
use super::AppState;
use crate::error::AppError;
use crate::models::SaveQuotationRequest;
use crate::service::{ListQuery, SaveOutcome};

const NO_CACHE: [(header::HeaderName, &str); 1] = [(header::CACHE_CONTROL, "no-cache")];

pub async fn list_quotations(
    State(state): State<AppState>,
    params: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.quotations.list(&query(params)?).await?;
    Ok((NO_CACHE, Json(page)))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quotation = state.quotations.get(&id).await?;
    Ok((NO_CACHE, Json(quotation)))
}

pub async fn save_quotation(
    State(state): State<AppState>,
    payload: Result<Json<SaveQuotationRequest>, JsonRejection>,
) -> Result<Json<SaveOutcome>, AppError> {
    let outcome = state.quotations.save(body(payload)?).await?;
    Ok(Json(outcome))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.quotations.delete(&id).await?;
    Ok(Json(json!({ "message": "Quotation deleted successfully" })))
}
