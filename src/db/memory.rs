use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::document::{apply_merge, field_value, Document, DocumentStore, StoreError, WriteBatch, WriteOp};

/// 内存文档库 (开发 / 测试用)
///
/// 写操作持有提交锁的写锁, 读操作持有读锁, 读不到提交到一半的工作单元;
/// `commit` 先在暂存区演算全部操作, 全部成功后才落到集合中, 中途失败则什么都不写。
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, BTreeMap<String, Value>>,
    counters: DashMap<String, i64>,
    commit_lock: RwLock<()>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    fn write(&self, collection: &str, id: &str, data: Option<Value>) {
        match data {
            Some(data) => {
                self.collections
                    .entry(collection.to_string())
                    .or_default()
                    .insert(id.to_string(), data);
            }
            None => {
                if let Some(mut docs) = self.collections.get_mut(collection) {
                    docs.remove(id);
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let _guard = self.commit_lock.read().await;
        Ok(self.read(collection, id).map(|data| Document {
            id: id.to_string(),
            data,
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let _guard = self.commit_lock.read().await;
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query_by_field(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError> {
        let docs = self.list(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| field_value(&doc.data, field) == Some(value))
            .collect())
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        let _guard = self.commit_lock.write().await;
        self.write(collection, id, Some(data));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let _guard = self.commit_lock.write().await;
        let existed = self.read(collection, id).is_some();
        self.write(collection, id, None);
        Ok(existed)
    }

    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError> {
        let mut current = self.counters.entry(counter.to_string()).or_insert(0);
        *current += 1;
        Ok(*current)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.commit_lock.write().await;

        // 暂存区: (collection, id) -> 提交后的值 (None 表示删除)
        let mut staged: HashMap<(String, String), Option<Value>> = HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();

        for op in batch.into_ops() {
            match op {
                WriteOp::Set { collection, id, data } => {
                    let key = (collection, id);
                    if !staged.contains_key(&key) {
                        order.push(key.clone());
                    }
                    staged.insert(key, Some(data));
                }
                WriteOp::Merge { collection, id, fields } => {
                    let key = (collection, id);
                    let current = match staged.get(&key) {
                        Some(value) => value.clone(),
                        None => self.read(&key.0, &key.1),
                    };
                    let Some(mut data) = current else {
                        return Err(StoreError::NotFound {
                            collection: key.0,
                            id: key.1,
                        });
                    };
                    for (path, value) in fields {
                        apply_merge(&mut data, &path, value)?;
                    }
                    if !staged.contains_key(&key) {
                        order.push(key.clone());
                    }
                    staged.insert(key, Some(data));
                }
                WriteOp::Delete { collection, id } => {
                    let key = (collection, id);
                    if !staged.contains_key(&key) {
                        order.push(key.clone());
                    }
                    staged.insert(key, None);
                }
            }
        }

        for key in order {
            if let Some(value) = staged.remove(&key) {
                self.write(&key.0, &key.1, value);
            }
        }
        Ok(())
    }
}
