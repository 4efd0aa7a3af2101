use std::sync::Arc;

use super::document::{DocumentStore, StoreError};
use crate::models::MetalPriceTable;

const METAL_PRICES: &str = "metalPrices";
const PRICES_DOC: &str = "prices";

/// 金属价格表存取: 唯一文档 `metalPrices/prices`, 整表替换
#[derive(Clone)]
pub struct PriceRepository {
    store: Arc<dyn DocumentStore>,
}

impl PriceRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn current(&self) -> Result<Option<MetalPriceTable>, StoreError> {
        match self.store.get(METAL_PRICES, PRICES_DOC).await? {
            Some(doc) => Ok(Some(doc.parse()?)),
            None => Ok(None),
        }
    }

    pub async fn replace(&self, table: &MetalPriceTable) -> Result<(), StoreError> {
        self.store
            .put(METAL_PRICES, PRICES_DOC, serde_json::to_value(table)?)
            .await
    }
}
