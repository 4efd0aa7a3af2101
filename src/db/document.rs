use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::blob::BlobError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("invalid field path: {0}")]
    InvalidPath(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Blob(#[from] BlobError),

    /// 头文档与实际数据不一致 (例如标记了对象存储却没有路径)
    #[error("inconsistent document: {0}")]
    Inconsistent(String),
}

/// 集合中的一条 JSON 文档
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// 单个写操作
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// 整体写入 (覆盖)
    Set { collection: String, id: String, data: Value },
    /// 按点号路径更新字段, 文档必须已存在
    Merge {
        collection: String,
        id: String,
        fields: Vec<(String, Value)>,
    },
    Delete { collection: String, id: String },
}

/// 工作单元: 一组写操作, 要么全部提交, 要么全部不生效
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&mut self, collection: &str, id: &str, value: &T) -> Result<&mut Self, StoreError> {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data: serde_json::to_value(value)?,
        });
        Ok(self)
    }

    pub fn merge<T: Serialize>(&mut self, collection: &str, id: &str, path: &str, value: &T) -> Result<&mut Self, StoreError> {
        let value = serde_json::to_value(value)?;
        // 同一文档的连续 merge 合并成一个操作
        if let Some(WriteOp::Merge { collection: c, id: i, fields }) = self.ops.last_mut() {
            if c == collection && i == id {
                fields.push((path.to_string(), value));
                return Ok(self);
            }
        }
        self.ops.push(WriteOp::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: vec![(path.to_string(), value)],
        });
        Ok(self)
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// 文档数据库抽象, 后端由配置选择 (内存 / Postgres)
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// 集合内全部文档, 按 id 升序
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// 点号路径字段等于给定值的文档, 按 id 升序
    async fn query_by_field(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError>;

    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    /// 返回文档是否存在过
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// 自增序号 (从 1 开始)
    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError>;

    /// 原子提交一个工作单元
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// 子集合路径: `quotations/Q-00001/diamondItems`
pub fn subcollection(parent: &str, parent_id: &str, name: &str) -> String {
    format!("{}/{}/{}", parent, parent_id, name)
}

/// 按点号路径读取字段
pub fn field_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, key| current.get(key))
}

/// 按点号路径写入字段, 中间层对象不存在时自动创建
pub fn apply_merge(data: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let keys: Vec<&str> = path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }

    let (last, parents) = keys
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

    let mut current = data;
    for key in parents {
        let Value::Object(map) = current else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(StoreError::InvalidPath(path.to_string())),
    }
}

/// 把点号路径展开成嵌套对象: `a.b = 1` -> `{"a": {"b": 1}}`
pub fn nested_object(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key.to_string(), inner);
        Value::Object(map)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_creates_intermediate_objects() {
        let mut doc = json!({"quotationId": "Q-00001"});
        apply_merge(&mut doc, "summary.totalDiamondAmount", json!("10.00")).unwrap();
        assert_eq!(doc, json!({"quotationId": "Q-00001", "summary": {"totalDiamondAmount": "10.00"}}));

        apply_merge(&mut doc, "summary.metalSummary", json!([])).unwrap();
        assert_eq!(field_value(&doc, "summary.totalDiamondAmount"), Some(&json!("10.00")));
        assert_eq!(field_value(&doc, "summary.metalSummary"), Some(&json!([])));
    }

    #[test]
    fn merge_rejects_bad_paths() {
        let mut doc = json!({"summary": 5});
        assert!(apply_merge(&mut doc, "summary.total", json!(1)).is_err());
        assert!(apply_merge(&mut doc, "a..b", json!(1)).is_err());
    }

    #[test]
    fn nested_object_expands_path() {
        assert_eq!(
            nested_object("identification.category", json!("Ring")),
            json!({"identification": {"category": "Ring"}})
        );
    }

    #[test]
    fn consecutive_merges_on_same_doc_are_folded() {
        let mut batch = WriteBatch::new();
        batch.merge("quotations", "Q-1", "a", &1).unwrap();
        batch.merge("quotations", "Q-1", "b", &2).unwrap();
        batch.delete("quotations/Q-1/x", "item_0000");
        assert_eq!(batch.len(), 2);
    }
}
