use std::sync::Arc;

use super::document::{DocumentStore, StoreError};
use crate::models::{DiamondInput, DiamondVariant};

const DIAMONDS: &str = "diamonds";
const DIAMOND_COUNTER: &str = "diamonds";

/// 钻石目录存取 (diamonds 集合, 文档 id 即数字 id)
#[derive(Clone)]
pub struct CatalogRepository {
    store: Arc<dyn DocumentStore>,
}

impl CatalogRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 全部目录条目, 按 id 升序
    pub async fn list_diamonds(&self) -> Result<Vec<DiamondVariant>, StoreError> {
        let docs = self.store.list(DIAMONDS).await?;
        let mut variants = docs
            .iter()
            .map(|doc| doc.parse::<DiamondVariant>())
            .collect::<Result<Vec<_>, _>>()?;
        // 文档 id 是字符串, 排序要按数字
        variants.sort_by_key(|v| v.id);
        Ok(variants)
    }

    pub async fn get_diamond(&self, id: i64) -> Result<Option<DiamondVariant>, StoreError> {
        match self.store.get(DIAMONDS, &id.to_string()).await? {
            Some(doc) => Ok(Some(doc.parse()?)),
            None => Ok(None),
        }
    }

    pub async fn create_diamond(&self, input: DiamondInput) -> Result<DiamondVariant, StoreError> {
        let id = self.store.next_sequence(DIAMOND_COUNTER).await?;
        let variant = DiamondVariant::new(id, input);
        self.store
            .put(DIAMONDS, &id.to_string(), serde_json::to_value(&variant)?)
            .await?;
        Ok(variant)
    }

    /// 覆盖写入, id 不存在时返回 None
    pub async fn update_diamond(&self, id: i64, input: DiamondInput) -> Result<Option<DiamondVariant>, StoreError> {
        if self.store.get(DIAMONDS, &id.to_string()).await?.is_none() {
            return Ok(None);
        }
        let variant = DiamondVariant::new(id, input);
        self.store
            .put(DIAMONDS, &id.to_string(), serde_json::to_value(&variant)?)
            .await?;
        Ok(Some(variant))
    }

    pub async fn delete_diamond(&self, id: i64) -> Result<bool, StoreError> {
        self.store.delete(DIAMONDS, &id.to_string()).await
    }
}
