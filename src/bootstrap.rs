use std::sync::Arc;
use thiserror::Error;

use crate::api::AppState;
use crate::config::{AppConfig, BlobBackend, DocumentBackend};
use crate::db::{
    BlobError, BlobStore, CatalogRepository, DocumentStore, FileBlobStore, MemoryBlobStore, MemoryDocumentStore,
    PgDocumentStore, PriceRepository, QuotationRepository, StoreError,
};
use crate::service::{BlobImageHost, CatalogService, ImageHost, PriceEngine, QuotationService};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("document store: {0}")]
    Store(#[from] StoreError),

    #[error("blob store: {0}")]
    Blob(#[from] BlobError),
}

pub async fn document_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, BootstrapError> {
    let store: Arc<dyn DocumentStore> = match config.storage.backend {
        DocumentBackend::Memory => {
            tracing::warn!("Using in-memory document store, data is lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
        DocumentBackend::Postgres => {
            let store = PgDocumentStore::connect(&config.database.url, config.database.max_connections).await?;
            tracing::info!("Database pool created");
            Arc::new(store)
        }
    };
    Ok(store)
}

pub async fn blob_store(config: &AppConfig) -> Result<Arc<dyn BlobStore>, BootstrapError> {
    let blobs: Arc<dyn BlobStore> = match config.storage.blob_backend {
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
        BlobBackend::File => {
            tracing::info!("Blob store at {}", config.storage.blob_dir);
            Arc::new(FileBlobStore::open(&config.storage.blob_dir).await?)
        }
    };
    Ok(blobs)
}

/// 按给定存储组装全部服务
pub fn assemble(config: &AppConfig, store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> AppState {
    let quotation_repo = QuotationRepository::new(store.clone(), blobs.clone(), config.storage.inline_limit_bytes);
    let price_repo = PriceRepository::new(store.clone());
    let engine = PriceEngine::new(quotation_repo.clone(), price_repo.clone());
    let images: Arc<dyn ImageHost> = Arc::new(BlobImageHost::new(blobs, config.images.public_base_url.clone()));

    AppState {
        catalog: Arc::new(CatalogService::new(CatalogRepository::new(store), price_repo, engine)),
        quotations: Arc::new(QuotationService::new(quotation_repo, images.clone())),
        images,
    }
}

/// 按配置选择后端并组装
pub async fn build_state(config: &AppConfig) -> Result<AppState, BootstrapError> {
    let store = document_store(config).await?;
    let blobs = blob_store(config).await?;
    Ok(assemble(config, store, blobs))
}
