use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};

use super::document::{apply_merge, nested_object, Document, DocumentStore, StoreError, WriteBatch, WriteOp};
use super::pool::{create_pool, ensure_schema};

/// Postgres 文档库: 所有集合共用一张 JSONB 表 `documents(collection, id, data)`
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 连接并确保表结构存在
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = create_pool(database_url, max_connections).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }
}

async fn upsert<'e, E: PgExecutor<'e>>(executor: E, collection: &str, id: &str, data: Value) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, data, updated_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (collection, id)
        DO UPDATE SET data = EXCLUDED.data, updated_at = now()
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(Json(data))
    .execute(executor)
    .await?;
    Ok(())
}

async fn remove<'e, E: PgExecutor<'e>>(executor: E, collection: &str, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn to_documents(rows: Vec<(String, Json<Value>)>) -> Vec<Document> {
    rows.into_iter()
        .map(|(id, Json(data))| Document { id, data })
        .collect()
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, (String, Json<Value>)>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, Json(data))| Document { id, data }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, (String, Json<Value>)>(
            "SELECT id, data FROM documents WHERE collection = $1 ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(to_documents(rows))
    }

    async fn query_by_field(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError> {
        // 用 JSONB 包含运算符匹配嵌套字段
        let probe = nested_object(field, value.clone());
        let rows = sqlx::query_as::<_, (String, Json<Value>)>(
            r#"
            SELECT id, data
            FROM documents
            WHERE collection = $1
              AND data @> $2
            ORDER BY id
            "#,
        )
        .bind(collection)
        .bind(Json(probe))
        .fetch_all(&self.pool)
        .await?;
        Ok(to_documents(rows))
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        upsert(&self.pool, collection, id, data).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(remove(&self.pool, collection, id).await?)
    }

    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError> {
        let next = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO counters (name, current_id)
            VALUES ($1, 1)
            ON CONFLICT (name)
            DO UPDATE SET current_id = counters.current_id + 1
            RETURNING current_id
            "#,
        )
        .bind(counter)
        .fetch_one(&self.pool)
        .await?;
        Ok(next)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let op_count = batch.len();
        let start_time = std::time::Instant::now();
        let mut tx = self.pool.begin().await?;

        for op in batch.into_ops() {
            match op {
                WriteOp::Set { collection, id, data } => {
                    upsert(&mut *tx, &collection, &id, data).await?;
                }
                WriteOp::Merge { collection, id, fields } => {
                    let current = sqlx::query_scalar::<_, Json<Value>>(
                        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    // 文档不存在: 直接返回, tx 被 drop 时自动回滚
                    let Some(Json(mut data)) = current else {
                        return Err(StoreError::NotFound { collection, id });
                    };
                    for (path, value) in fields {
                        apply_merge(&mut data, &path, value)?;
                    }
                    upsert(&mut *tx, &collection, &id, data).await?;
                }
                WriteOp::Delete { collection, id } => {
                    remove(&mut *tx, &collection, &id).await?;
                }
            }
        }

        tx.commit().await?;
        tracing::debug!("✓ 提交 {} 个写操作, 耗时: {:?}", op_count, start_time.elapsed());
        Ok(())
    }
}
