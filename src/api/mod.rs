pub mod handlers;
pub mod images;
pub mod quotations;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::service::{CatalogService, ImageHost, QuotationService};

pub use handlers::health_check;

/// 大报价单和图片都走请求体, 放宽默认的 2MB 限制
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// 各路由共享的服务
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub quotations: Arc<QuotationService>,
    pub images: Arc<dyn ImageHost>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/diamonds",
            get(handlers::list_diamonds).post(handlers::create_diamond),
        )
        .route(
            "/api/diamonds/:id",
            put(handlers::update_diamond).delete(handlers::delete_diamond),
        )
        .route(
            "/api/prices",
            get(handlers::get_prices).post(handlers::update_prices),
        )
        .route("/api/metadata", get(quotations::list_quotations))
        .route(
            "/api/metadata/:id",
            get(quotations::get_quotation).delete(quotations::delete_quotation),
        )
        .route("/api/save-quotation", post(quotations::save_quotation))
        .route("/api/upload-image", post(images::upload_image))
        .route("/api/images/*key", get(images::get_image))
        .route("/api/delete-image", delete(images::delete_image))
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(MAX_BODY_BYTES)))
        .with_state(state)
}
