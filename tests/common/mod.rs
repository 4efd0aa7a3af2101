#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use jewel_quote::bootstrap;
use jewel_quote::db::quotations::QUOTATIONS;
use jewel_quote::db::{BlobStore, Document, DocumentStore, MemoryBlobStore, MemoryDocumentStore, StoreError, WriteBatch};
use jewel_quote::{router, AppConfig, AppState};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

/// 内存后端 + 指定的内联阈值
pub fn app_with_limit(inline_limit_bytes: usize) -> TestApp {
    let mut config = AppConfig::default();
    config.storage.inline_limit_bytes = inline_limit_bytes;

    let store = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = bootstrap::assemble(
        &config,
        store.clone() as Arc<dyn DocumentStore>,
        blobs.clone() as Arc<dyn BlobStore>,
    );
    TestApp {
        router: router(state.clone()),
        state,
        store,
        blobs,
    }
}

/// 报价单头文档集合不可枚举, 其余操作照常转给内存库
pub struct QuotationListingDown(pub MemoryDocumentStore);

impl QuotationListingDown {
    fn unavailable() -> StoreError {
        StoreError::Inconsistent("quotation listing unavailable".to_string())
    }
}

#[async_trait]
impl DocumentStore for QuotationListingDown {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.0.get(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        if collection == QUOTATIONS {
            return Err(Self::unavailable());
        }
        self.0.list(collection).await
    }

    async fn query_by_field(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError> {
        if collection == QUOTATIONS {
            return Err(Self::unavailable());
        }
        self.0.query_by_field(collection, field, value).await
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.0.put(collection, id, data).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.0.delete(collection, id).await
    }

    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError> {
        self.0.next_sequence(counter).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.0.commit(batch).await
    }
}

/// 任意文档库 + 内存对象存储
pub fn router_with_store(store: Arc<dyn DocumentStore>) -> Router {
    let state = bootstrap::assemble(&AppConfig::default(), store, Arc::new(MemoryBlobStore::new()));
    router(state)
}

pub fn app() -> TestApp {
    app_with_limit(AppConfig::default().storage.inline_limit_bytes)
}

pub async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let body = match body {
        Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
        None => Body::empty(),
    };
    let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024 * 1024).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// 18KT 3g @5000 + 制作费 900, 钻石明细由调用方给出
pub fn quotation_body(sku: &str, category: &str, diamonds: Value, diamond_total: &str, metal_total: &str) -> Value {
    json!({
        "identification": {"idSku": sku, "category": category, "images": []},
        "metalItems": [
            {"purity": "18KT", "grams": "3.00", "ratePerGram": "5000.00", "totalMetal": "15000.00", "makingCharges": "900.00", "total": "15900.00"}
        ],
        "diamondItems": diamonds,
        "summary": {
            "totalDiamondAmount": diamond_total,
            "metalSummary": [
                {"purity": "18KT", "grams": "3.00", "ratePerGram": "5000.00", "totalMetal": "15000.00", "makingCharges": "900.00", "totalDiamondAmount": diamond_total, "total": metal_total}
            ]
        }
    })
}

/// ROUND 6mm, 2.0ct @4000 = 8000
pub fn round_six_quotation(sku: &str) -> Value {
    quotation_body(
        sku,
        "Ring",
        json!([
            {"shape": "ROUND", "mm": 6, "pcs": 2, "weightPerPiece": "1.00", "totalWeightCt": "2.00", "pricePerCt": "4000.00", "total": "8000.00"}
        ]),
        "8000.00",
        "23900.00",
    )
}

pub async fn save(router: &Router, body: Value) -> String {
    let (status, resp) = call(router, "POST", "/api/save-quotation", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "save failed: {}", resp);
    resp["quotationId"].as_str().unwrap().to_string()
}
