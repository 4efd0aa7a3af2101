use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::quotations::{DIAMOND_ITEMS, METAL_ITEMS, METAL_SUMMARY, QUOTATIONS};
use crate::db::{Line, PriceRepository, QuotationHeader, QuotationRepository, StoreError, WriteBatch};
use crate::models::{diamond_total, DiamondItem, DiamondVariant, MetalItem, MetalPriceTable, MetalSummaryRow, Quotation};

/// 单个报价单联动失败的原因
#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("purity {0} has no price in the new table")]
    MissingPurity(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 无法枚举报价单时, 失败记录用它代替报价单编号
pub const ALL_QUOTATIONS: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationFailure {
    pub quotation_id: String,
    pub error: String,
}

/// 一次联动的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationReport {
    /// 更新过的内联报价单
    pub updated_quotations: Vec<String>,
    /// 更新过的对象存储报价单
    pub updated_blob_quotations: Vec<String>,
    /// 实际改动的明细行数
    pub touched_items: usize,
    pub failed: Vec<PropagationFailure>,
}

impl PropagationReport {
    fn fail(&mut self, quotation_id: &str, err: &PropagationError) {
        tracing::error!("Propagation failed for quotation {}: {}", quotation_id, err);
        self.failed.push(PropagationFailure {
            quotation_id: quotation_id.to_string(),
            error: err.to_string(),
        });
    }

    /// 头文档枚举失败时记一条整体失败, 跳过这一批
    fn headers_or_fail(&mut self, listing: Result<Vec<QuotationHeader>, StoreError>) -> Vec<QuotationHeader> {
        listing.unwrap_or_else(|e| {
            self.fail(ALL_QUOTATIONS, &PropagationError::Store(e));
            Vec::new()
        })
    }
}

/// 重算与目录条目匹配的钻石明细, 返回发生变化的下标
pub fn reprice_diamond_items(items: &mut [DiamondItem], variant: &DiamondVariant) -> Vec<usize> {
    items
        .iter_mut()
        .enumerate()
        .filter(|(_, item)| variant.matches(&item.shape, &item.mm))
        .filter_map(|(idx, item)| item.reprice(&variant.price_per_carat).then_some(idx))
        .collect()
}

/// 新钻石总额写入每个汇总行
pub fn apply_diamond_amount(rows: &mut [MetalSummaryRow], amount: &BigDecimal, now: DateTime<Utc>) {
    for row in rows.iter_mut() {
        row.apply_diamond_amount(amount, now);
    }
}

/// 金属明细与汇总行按新价格表重算
///
/// 两边都没有出现在价格表中的成色时返回 `Ok(None)` (跳过);
/// 只要有一行的成色不在表中就整单失败, 且不改动任何行。
/// 否则返回发生变化的 (金属明细下标, 汇总行下标)。
pub fn reprice_metal_rows(
    items: &mut [MetalItem],
    rows: &mut [MetalSummaryRow],
    table: &MetalPriceTable,
    now: DateTime<Utc>,
) -> Result<Option<(Vec<usize>, Vec<usize>)>, PropagationError> {
    let purities = items
        .iter()
        .map(|i| i.purity.as_str())
        .chain(rows.iter().map(|r| r.purity.as_str()));

    let relevant = purities.clone().any(|p| table.contains(p));
    if !relevant {
        return Ok(None);
    }
    if let Some(missing) = purities.clone().find(|p| !table.contains(p)) {
        return Err(PropagationError::MissingPurity(missing.to_string()));
    }

    let mut changed_items = Vec::new();
    for (idx, item) in items.iter_mut().enumerate() {
        if let Some(rate) = table.rate(&item.purity) {
            if item.reprice(rate) {
                changed_items.push(idx);
            }
        }
    }

    let mut changed_rows = Vec::new();
    for (idx, row) in rows.iter_mut().enumerate() {
        if let Some(rate) = table.rate(&row.purity) {
            if row.reprice(rate, now) {
                changed_rows.push(idx);
            }
        }
    }

    Ok(Some((changed_items, changed_rows)))
}

fn split_lines<T>(lines: Vec<Line<T>>) -> (Vec<String>, Vec<T>) {
    lines.into_iter().map(|l| (l.id, l.item)).unzip()
}

/// 价格联动引擎: 目录或价格表变化后, 重算所有受影响的报价单
///
/// 每个内联报价单的改动在一个工作单元里提交; 对象存储报价单整单下载、修改、
/// 重新上传。单个报价单失败只记录, 不影响其它报价单。
#[derive(Clone)]
pub struct PriceEngine {
    quotations: QuotationRepository,
    prices: PriceRepository,
}

impl PriceEngine {
    pub fn new(quotations: QuotationRepository, prices: PriceRepository) -> Self {
        Self { quotations, prices }
    }

    /// 钻石目录价格变化; 目录本身已写入, 这里的任何失败都只记入报告
    pub async fn on_diamond_price_changed(&self, variant: &DiamondVariant) -> PropagationReport {
        let now = Utc::now();
        let mut report = PropagationReport::default();

        tracing::info!(
            "Propagating diamond {} ({}) price {} to quotations",
            variant.id,
            variant.display_label,
            variant.price_per_carat
        );

        // 1. 内联报价单
        let headers = report.headers_or_fail(self.quotations.inline_headers().await);
        for header in headers {
            let id = header.quotation_id.clone();
            match self.reprice_inline_diamonds(&id, variant, now).await {
                Ok(0) => tracing::debug!("Quotation {} has no matching diamond items", id),
                Ok(touched) => {
                    tracing::info!("Quotation {}: {} diamond item(s) repriced", id, touched);
                    report.touched_items += touched;
                    report.updated_quotations.push(id);
                }
                Err(e) => report.fail(&id, &e),
            }
        }

        // 2. 对象存储报价单
        let headers = report.headers_or_fail(self.quotations.blob_headers().await);
        for header in headers {
            let id = header.quotation_id.clone();
            if header.storage_path.is_none() {
                tracing::warn!("Quotation {} is marked as blob-stored but has no storagePath, skipping", id);
                continue;
            }
            match self.reprice_blob_diamonds(&header, variant, now).await {
                Ok(0) => {}
                Ok(touched) => {
                    tracing::info!("Blob quotation {}: {} diamond item(s) repriced", id, touched);
                    report.touched_items += touched;
                    report.updated_blob_quotations.push(id);
                }
                Err(e) => report.fail(&id, &e),
            }
        }

        tracing::info!(
            "Diamond propagation done: inline {}, blob {}, items {}, failed {}",
            report.updated_quotations.len(),
            report.updated_blob_quotations.len(),
            report.touched_items,
            report.failed.len()
        );
        report
    }

    async fn reprice_inline_diamonds(
        &self,
        quotation_id: &str,
        variant: &DiamondVariant,
        now: DateTime<Utc>,
    ) -> Result<usize, PropagationError> {
        let (diamond_lines, summary_lines) = futures::try_join!(
            self.quotations.lines::<DiamondItem>(quotation_id, DIAMOND_ITEMS),
            self.quotations.lines::<MetalSummaryRow>(quotation_id, METAL_SUMMARY),
        )?;
        let (diamond_ids, mut diamonds) = split_lines(diamond_lines);
        let (row_ids, mut rows) = split_lines(summary_lines);

        // 1. 重算匹配的钻石明细, 没有变化就不写
        let changed = reprice_diamond_items(&mut diamonds, variant);
        if changed.is_empty() {
            return Ok(0);
        }

        // 2. 钻石总额 -> 每个汇总行
        let total = diamond_total(&diamonds);
        apply_diamond_amount(&mut rows, &total, now);

        // 3. 一个工作单元: 变化的钻石明细 + 全部汇总行 + 头文档镜像
        let diamond_coll = QuotationRepository::lines_collection(quotation_id, DIAMOND_ITEMS);
        let summary_coll = QuotationRepository::lines_collection(quotation_id, METAL_SUMMARY);
        let mut batch = WriteBatch::new();
        for &idx in &changed {
            batch.set(&diamond_coll, &diamond_ids[idx], &diamonds[idx])?;
        }
        for (row_id, row) in row_ids.iter().zip(&rows) {
            batch.set(&summary_coll, row_id, row)?;
        }
        batch.merge(QUOTATIONS, quotation_id, "summary.totalDiamondAmount", &total)?;
        batch.merge(QUOTATIONS, quotation_id, "summary.metalSummary", &rows)?;
        self.quotations.commit(batch).await?;

        Ok(changed.len())
    }

    async fn reprice_blob_diamonds(
        &self,
        header: &QuotationHeader,
        variant: &DiamondVariant,
        now: DateTime<Utc>,
    ) -> Result<usize, PropagationError> {
        let path = header.require_storage_path()?;
        let mut quotation = self.quotations.read_blob(path).await?;

        let changed = reprice_diamond_items(&mut quotation.diamond_items, variant);
        if changed.is_empty() {
            return Ok(0);
        }

        let total = diamond_total(&quotation.diamond_items);
        quotation.summary.total_diamond_amount = total.clone();
        apply_diamond_amount(&mut quotation.summary.metal_summary, &total, now);

        self.quotations.write_blob(path, &quotation).await?;

        let mut batch = WriteBatch::new();
        batch.merge(QUOTATIONS, &header.quotation_id, "summary.totalDiamondAmount", &total)?;
        self.quotations.commit(batch).await?;

        Ok(changed.len())
    }

    /// 金属价格表变化: 先整表替换, 再联动报价单
    ///
    /// 只有价格表本身写入失败才返回错误, 之后的失败都记入报告。
    pub async fn on_metal_price_table_changed(&self, table: &MetalPriceTable) -> Result<PropagationReport, StoreError> {
        let now = Utc::now();
        let mut report = PropagationReport::default();

        // 1. 替换价格表
        self.prices.replace(table).await?;
        tracing::info!("Metal price table replaced ({} purities)", table.len());

        // 2. 内联报价单
        let headers = report.headers_or_fail(self.quotations.inline_headers().await);
        for header in headers {
            let id = header.quotation_id.clone();
            match self.reprice_inline_metals(&id, table, now).await {
                Ok(None) => tracing::debug!("Quotation {} has no affected purity, skipping", id),
                Ok(Some(0)) => {}
                Ok(Some(touched)) => {
                    report.touched_items += touched;
                    report.updated_quotations.push(id);
                }
                Err(e) => report.fail(&id, &e),
            }
        }

        // 3. 对象存储报价单
        let headers = report.headers_or_fail(self.quotations.blob_headers().await);
        for header in headers {
            let id = header.quotation_id.clone();
            if header.storage_path.is_none() {
                tracing::warn!("Quotation {} is marked as blob-stored but has no storagePath, skipping", id);
                continue;
            }
            match self.reprice_blob_metals(&header, table, now).await {
                Ok(None) | Ok(Some(0)) => {}
                Ok(Some(touched)) => {
                    report.touched_items += touched;
                    report.updated_blob_quotations.push(id);
                }
                Err(e) => report.fail(&id, &e),
            }
        }

        tracing::info!(
            "Metal propagation done: inline {}, blob {}, items {}, failed {}",
            report.updated_quotations.len(),
            report.updated_blob_quotations.len(),
            report.touched_items,
            report.failed.len()
        );
        Ok(report)
    }

    async fn reprice_inline_metals(
        &self,
        quotation_id: &str,
        table: &MetalPriceTable,
        now: DateTime<Utc>,
    ) -> Result<Option<usize>, PropagationError> {
        let (metal_lines, summary_lines) = futures::try_join!(
            self.quotations.lines::<MetalItem>(quotation_id, METAL_ITEMS),
            self.quotations.lines::<MetalSummaryRow>(quotation_id, METAL_SUMMARY),
        )?;
        let (item_ids, mut items) = split_lines(metal_lines);
        let (row_ids, mut rows) = split_lines(summary_lines);

        let Some((changed_items, changed_rows)) = reprice_metal_rows(&mut items, &mut rows, table, now)? else {
            return Ok(None);
        };
        let touched = changed_items.len() + changed_rows.len();
        if touched == 0 {
            return Ok(Some(0));
        }

        // 全部金属行 + 全部汇总行 + 头文档镜像
        let item_coll = QuotationRepository::lines_collection(quotation_id, METAL_ITEMS);
        let summary_coll = QuotationRepository::lines_collection(quotation_id, METAL_SUMMARY);
        let mut batch = WriteBatch::new();
        for (item_id, item) in item_ids.iter().zip(&items) {
            batch.set(&item_coll, item_id, item)?;
        }
        for (row_id, row) in row_ids.iter().zip(&rows) {
            batch.set(&summary_coll, row_id, row)?;
        }
        batch.merge(QUOTATIONS, quotation_id, "summary.metalSummary", &rows)?;
        self.quotations.commit(batch).await?;

        Ok(Some(touched))
    }

    async fn reprice_blob_metals(
        &self,
        header: &QuotationHeader,
        table: &MetalPriceTable,
        now: DateTime<Utc>,
    ) -> Result<Option<usize>, PropagationError> {
        let path = header.require_storage_path()?;
        let mut quotation: Quotation = self.quotations.read_blob(path).await?;

        let Some((changed_items, changed_rows)) = reprice_metal_rows(
            &mut quotation.metal_items,
            &mut quotation.summary.metal_summary,
            table,
            now,
        )?
        else {
            return Ok(None);
        };
        let touched = changed_items.len() + changed_rows.len();
        if touched > 0 {
            self.quotations.write_blob(path, &quotation).await?;
        }
        Ok(Some(touched))
    }
}
