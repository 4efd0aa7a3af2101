use serde::Serialize;
use serde_json::Value;

use super::propagation::{PriceEngine, PropagationFailure};
use crate::db::{CatalogRepository, PriceRepository};
use crate::error::{AppError, ResultExt};
use crate::models::{DiamondPayload, DiamondVariant, MetalPriceTable};

/// 更新钻石目录条目的响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiamondUpdateOutcome {
    pub diamond: DiamondVariant,
    /// 更新过的内联报价单编号
    pub updated_metadata: Vec<String>,
    /// 更新过的对象存储报价单编号
    pub updated_cloud_metadata: Vec<String>,
    pub touched_items: usize,
    pub failed: Vec<PropagationFailure>,
}

/// 更新金属价格表的响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateOutcome {
    pub message: String,
    pub updated_quotations: Vec<String>,
    pub updated_cloud_quotations: Vec<String>,
    pub failed: Vec<PropagationFailure>,
}

/// 钻石目录与金属价格表, 写入后触发价格联动
#[derive(Clone)]
pub struct CatalogService {
    catalog: CatalogRepository,
    prices: PriceRepository,
    engine: PriceEngine,
}

impl CatalogService {
    pub fn new(catalog: CatalogRepository, prices: PriceRepository, engine: PriceEngine) -> Self {
        Self {
            catalog,
            prices,
            engine,
        }
    }

    pub async fn list_diamonds(&self) -> Result<Vec<DiamondVariant>, AppError> {
        self.catalog.list_diamonds().await.or_fail("Failed to fetch diamonds")
    }

    pub async fn create_diamond(&self, payload: DiamondPayload) -> Result<DiamondVariant, AppError> {
        let input = payload.validate()?;
        let variant = self
            .catalog
            .create_diamond(input)
            .await
            .or_fail("Failed to add diamond")?;
        tracing::info!("Diamond {} created: {}", variant.id, variant.display_label);
        Ok(variant)
    }

    /// 写入目录后把新价格联动到所有报价单; 单个报价单失败不影响接口结果
    pub async fn update_diamond(&self, id: i64, payload: DiamondPayload) -> Result<DiamondUpdateOutcome, AppError> {
        let input = payload.validate()?;
        let diamond = self
            .catalog
            .update_diamond(id, input)
            .await
            .or_fail("Failed to update diamond")?
            .ok_or_else(|| AppError::not_found("Diamond not found"))?;

        let report = self.engine.on_diamond_price_changed(&diamond).await;

        Ok(DiamondUpdateOutcome {
            diamond,
            updated_metadata: report.updated_quotations,
            updated_cloud_metadata: report.updated_blob_quotations,
            touched_items: report.touched_items,
            failed: report.failed,
        })
    }

    pub async fn delete_diamond(&self, id: i64) -> Result<(), AppError> {
        let deleted = self
            .catalog
            .delete_diamond(id)
            .await
            .or_fail("Failed to delete diamond")?;
        if !deleted {
            return Err(AppError::not_found("Diamond not found"));
        }
        tracing::info!("Diamond {} deleted", id);
        Ok(())
    }

    pub async fn current_prices(&self) -> Result<MetalPriceTable, AppError> {
        self.prices
            .current()
            .await
            .or_fail("Failed to fetch prices")?
            .ok_or_else(|| AppError::not_found("Prices not found"))
    }

    pub async fn update_prices(&self, payload: Value) -> Result<PriceUpdateOutcome, AppError> {
        let table = MetalPriceTable::from_payload(payload)?;
        let report = self
            .engine
            .on_metal_price_table_changed(&table)
            .await
            .or_fail("Failed to update prices")?;

        Ok(PriceUpdateOutcome {
            message: "Prices updated successfully".to_string(),
            updated_quotations: report.updated_quotations,
            updated_cloud_quotations: report.updated_blob_quotations,
            failed: report.failed,
        })
    }
}
