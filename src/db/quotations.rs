use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::blob::{BlobError, BlobStore};
use super::document::{subcollection, Document, DocumentStore, StoreError, WriteBatch};
use crate::models::{DiamondItem, Identification, MetalItem, MetalSummaryRow, Quotation, Summary};

pub const QUOTATIONS: &str = "quotations";
pub const METAL_ITEMS: &str = "metalItems";
pub const DIAMOND_ITEMS: &str = "diamondItems";
pub const METAL_SUMMARY: &str = "metalSummary";

const QUOTATION_COUNTER: &str = "quotations";
pub const DEFAULT_INLINE_LIMIT_BYTES: usize = 1_000_000;

/// 报价单存储方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageMode {
    Inline,
    Blob,
}

/// `quotations/{id}` 头文档
///
/// 内联模式: 标识 + 日期 + 汇总镜像; 对象存储模式: 额外带 `storedInCloudStorage`
/// 和 `storagePath`, 明细全部在对象存储的 JSON 里。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationHeader {
    #[serde(default)]
    pub quotation_id: String,
    #[serde(default)]
    pub identification: Identification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stored_in_cloud_storage: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

impl QuotationHeader {
    fn inline(q: &Quotation) -> Self {
        Self {
            quotation_id: q.quotation_id.clone(),
            identification: q.identification.clone(),
            quotation_date: Some(q.quotation_date),
            summary: Summary {
                id_sku: Some(q.identification.id_sku.clone()),
                category: Some(q.identification.category.clone()),
                total_diamond_amount: q.summary.total_diamond_amount.clone(),
                metal_summary: q.summary.metal_summary.clone(),
            },
            stored_in_cloud_storage: false,
            storage_path: None,
        }
    }

    fn blob(q: &Quotation, storage_path: String) -> Self {
        Self {
            quotation_id: q.quotation_id.clone(),
            identification: Identification {
                images: Vec::new(),
                ..q.identification.clone()
            },
            quotation_date: Some(q.quotation_date),
            summary: Summary {
                total_diamond_amount: q.summary.total_diamond_amount.clone(),
                ..Summary::default()
            },
            stored_in_cloud_storage: true,
            storage_path: Some(storage_path),
        }
    }

    fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut header: QuotationHeader = doc.parse()?;
        if header.quotation_id.is_empty() {
            header.quotation_id = doc.id.clone();
        }
        Ok(header)
    }

    pub fn is_blob(&self) -> bool {
        self.stored_in_cloud_storage
    }

    /// 对象存储路径, 标记了对象存储却没有路径时报错
    pub fn require_storage_path(&self) -> Result<&str, StoreError> {
        self.storage_path.as_deref().ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "quotation {} is marked as stored in blob storage but has no storagePath",
                self.quotation_id
            ))
        })
    }
}

/// 子集合中的一行, 保留文档 id 以便原位写回
#[derive(Debug, Clone, PartialEq)]
pub struct Line<T> {
    pub id: String,
    pub item: T,
}

/// 报价单持久化: 头文档 + 三个明细子集合, 超过阈值时整单落到对象存储
#[derive(Clone)]
pub struct QuotationRepository {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    inline_limit_bytes: usize,
}

impl QuotationRepository {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>, inline_limit_bytes: usize) -> Self {
        Self {
            store,
            blobs,
            inline_limit_bytes,
        }
    }

    pub fn blob_path(quotation_id: &str) -> String {
        format!("quotations/{}.json", quotation_id)
    }

    /// 明细文档 id: `item_0000`; 超过四位时不再补零, 行顺序以 `line_index` 为准
    pub fn line_id(index: usize) -> String {
        format!("item_{:04}", index)
    }

    pub fn line_index(id: &str) -> Option<usize> {
        id.strip_prefix("item_")?.parse().ok()
    }

    pub fn lines_collection(quotation_id: &str, name: &str) -> String {
        subcollection(QUOTATIONS, quotation_id, name)
    }

    pub async fn next_id(&self) -> Result<String, StoreError> {
        let n = self.store.next_sequence(QUOTATION_COUNTER).await?;
        Ok(format!("Q-{:05}", n))
    }

    pub async fn header(&self, quotation_id: &str) -> Result<Option<QuotationHeader>, StoreError> {
        match self.store.get(QUOTATIONS, quotation_id).await? {
            Some(doc) => Ok(Some(QuotationHeader::from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// 全部头文档 (内联 + 对象存储)
    pub async fn headers(&self) -> Result<Vec<QuotationHeader>, StoreError> {
        let docs = self.store.list(QUOTATIONS).await?;
        docs.iter().map(QuotationHeader::from_document).collect()
    }

    pub async fn inline_headers(&self) -> Result<Vec<QuotationHeader>, StoreError> {
        let mut headers = self.headers().await?;
        headers.retain(|h| !h.is_blob());
        Ok(headers)
    }

    pub async fn blob_headers(&self) -> Result<Vec<QuotationHeader>, StoreError> {
        let docs = self
            .store
            .query_by_field(QUOTATIONS, "storedInCloudStorage", &serde_json::Value::Bool(true))
            .await?;
        docs.iter().map(QuotationHeader::from_document).collect()
    }

    /// 读取一个明细子集合, 按行顺序
    pub async fn lines<T: DeserializeOwned>(&self, quotation_id: &str, name: &str) -> Result<Vec<Line<T>>, StoreError> {
        let docs = self
            .store
            .list(&Self::lines_collection(quotation_id, name))
            .await?;
        let mut lines = docs
            .into_iter()
            .map(|doc| -> Result<Line<T>, StoreError> {
                let item = doc.parse()?;
                Ok(Line { id: doc.id, item })
            })
            .collect::<Result<Vec<_>, _>>()?;
        // 文档库按 id 字符串排序, item_10000 会排在 item_9999 之前
        lines.sort_by(|a, b| {
            Self::line_index(&a.id)
                .cmp(&Self::line_index(&b.id))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(lines)
    }

    /// 按头文档组装完整报价单 (内联与对象存储结果结构相同)
    pub async fn load(&self, header: &QuotationHeader) -> Result<Quotation, StoreError> {
        if header.is_blob() {
            let path = header.require_storage_path()?;
            let mut quotation = self.read_blob(path).await?;
            if quotation.quotation_id.is_empty() {
                quotation.quotation_id = header.quotation_id.clone();
            }
            return Ok(quotation);
        }

        let id = header.quotation_id.as_str();
        let (metal_items, diamond_items, metal_summary) = futures::try_join!(
            self.lines::<MetalItem>(id, METAL_ITEMS),
            self.lines::<DiamondItem>(id, DIAMOND_ITEMS),
            self.lines::<MetalSummaryRow>(id, METAL_SUMMARY),
        )?;

        Ok(Quotation {
            quotation_id: header.quotation_id.clone(),
            identification: header.identification.clone(),
            metal_items: metal_items.into_iter().map(|l| l.item).collect(),
            diamond_items: diamond_items.into_iter().map(|l| l.item).collect(),
            summary: Summary {
                metal_summary: metal_summary.into_iter().map(|l| l.item).collect(),
                ..header.summary.clone()
            },
            quotation_date: header.quotation_date.unwrap_or_default(),
        })
    }

    pub async fn get(&self, quotation_id: &str) -> Result<Option<Quotation>, StoreError> {
        match self.header(quotation_id).await? {
            Some(header) => Ok(Some(self.load(&header).await?)),
            None => Ok(None),
        }
    }

    pub async fn read_blob(&self, path: &str) -> Result<Quotation, StoreError> {
        let bytes = self
            .blobs
            .get(path)
            .await?
            .ok_or_else(|| BlobError::NotFound(path.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_blob(&self, path: &str, quotation: &Quotation) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(quotation)?;
        self.blobs.put(path, bytes).await?;
        Ok(())
    }

    /// 保存新报价单, 序列化后超过阈值则整单写入对象存储
    pub async fn save(&self, quotation: &Quotation) -> Result<StorageMode, StoreError> {
        let size = serde_json::to_vec(quotation)?.len();
        let id = quotation.quotation_id.as_str();

        if size > self.inline_limit_bytes {
            let path = Self::blob_path(id);
            self.write_blob(&path, quotation).await?;
            let header = QuotationHeader::blob(quotation, path.clone());
            self.store
                .put(QUOTATIONS, id, serde_json::to_value(&header)?)
                .await?;
            tracing::info!(
                "Quotation {} ({} bytes) exceeds inline limit {}, stored at {}",
                id,
                size,
                self.inline_limit_bytes,
                path
            );
            return Ok(StorageMode::Blob);
        }

        let mut batch = WriteBatch::new();
        batch.set(QUOTATIONS, id, &QuotationHeader::inline(quotation))?;
        for (index, item) in quotation.metal_items.iter().enumerate() {
            batch.set(&Self::lines_collection(id, METAL_ITEMS), &Self::line_id(index), item)?;
        }
        for (index, item) in quotation.diamond_items.iter().enumerate() {
            batch.set(&Self::lines_collection(id, DIAMOND_ITEMS), &Self::line_id(index), item)?;
        }
        for (index, row) in quotation.summary.metal_summary.iter().enumerate() {
            batch.set(&Self::lines_collection(id, METAL_SUMMARY), &Self::line_id(index), row)?;
        }
        self.store.commit(batch).await?;
        Ok(StorageMode::Inline)
    }

    /// 删除头文档与全部明细; 对象存储模式同时删除 JSON
    pub async fn delete(&self, header: &QuotationHeader) -> Result<(), StoreError> {
        let id = header.quotation_id.as_str();
        let mut batch = WriteBatch::new();

        if !header.is_blob() {
            for name in [METAL_ITEMS, DIAMOND_ITEMS, METAL_SUMMARY] {
                let collection = Self::lines_collection(id, name);
                for doc in self.store.list(&collection).await? {
                    batch.delete(&collection, &doc.id);
                }
            }
        }
        batch.delete(QUOTATIONS, id);
        self.store.commit(batch).await?;

        if let Some(path) = header.storage_path.as_deref() {
            if let Err(e) = self.blobs.delete(path).await {
                tracing::warn!("Quotation {} deleted but blob {} was not: {}", id, path, e);
            }
        }
        Ok(())
    }

    /// 提交一个报价单的工作单元 (联动更新用)
    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.store.commit(batch).await
    }
}
