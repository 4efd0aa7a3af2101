use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::diamond::Millimeters;
use super::money::{self, round2};
use crate::error::AppError;

/// 报价单标识信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identification {
    #[serde(default, deserialize_with = "money::or_default")]
    pub id_sku: String,
    #[serde(default, deserialize_with = "money::or_default")]
    pub category: String,
    #[serde(default, deserialize_with = "money::or_default")]
    pub images: Vec<String>,
}

/// 金属明细行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetalItem {
    #[serde(default, deserialize_with = "money::or_default")]
    pub purity: String,
    #[serde(default, deserialize_with = "money::lenient")]
    pub grams: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub rate_per_gram: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total_metal: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub making_charges: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total: BigDecimal,
}

impl MetalItem {
    /// 按新单价重算, 返回是否有字段变化
    pub fn reprice(&mut self, rate: &BigDecimal) -> bool {
        let rate_per_gram = round2(rate);
        let total_metal = round2(&(&self.grams * &rate_per_gram));
        let total = round2(&(&total_metal + &self.making_charges));

        let changed = rate_per_gram != self.rate_per_gram
            || total_metal != self.total_metal
            || total != self.total;
        if changed {
            self.rate_per_gram = rate_per_gram;
            self.total_metal = total_metal;
            self.total = total;
        }
        changed
    }

    fn is_complete(&self) -> bool {
        !self.purity.trim().is_empty() && !self.grams.is_zero() && !self.rate_per_gram.is_zero()
    }
}

/// 钻石明细行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiamondItem {
    #[serde(default, deserialize_with = "money::or_default")]
    pub shape: String,
    #[serde(default, deserialize_with = "money::or_default")]
    pub mm: Millimeters,
    #[serde(default, deserialize_with = "money::lenient")]
    pub pcs: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub weight_per_piece: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total_weight_ct: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub price_per_ct: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total: BigDecimal,
}

impl DiamondItem {
    /// 按新克拉单价重算 total = totalWeightCt × pricePerCt, 返回是否有字段变化
    pub fn reprice(&mut self, price_per_carat: &BigDecimal) -> bool {
        let price_per_ct = round2(price_per_carat);
        let total = round2(&(&self.total_weight_ct * &price_per_ct));

        let changed = price_per_ct != self.price_per_ct || total != self.total;
        if changed {
            self.price_per_ct = price_per_ct;
            self.total = total;
        }
        changed
    }

    fn is_complete(&self) -> bool {
        !self.shape.trim().is_empty()
            && !matches!(&self.mm, Millimeters::Text(s) if s.trim().is_empty())
            && !self.price_per_ct.is_zero()
            && !self.total_weight_ct.is_zero()
    }
}

/// 汇总行: 每个金属明细一行, 带上共享的钻石总额
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetalSummaryRow {
    #[serde(default, deserialize_with = "money::or_default")]
    pub purity: String,
    #[serde(default, deserialize_with = "money::lenient")]
    pub grams: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub rate_per_gram: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total_metal: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub making_charges: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total_diamond_amount: BigDecimal,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total: BigDecimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MetalSummaryRow {
    fn row_total(&self) -> BigDecimal {
        round2(&(&self.total_metal + &self.making_charges + &self.total_diamond_amount))
    }

    /// 写入新的钻石总额并重算 total
    pub fn apply_diamond_amount(&mut self, amount: &BigDecimal, now: DateTime<Utc>) {
        self.total_diamond_amount = round2(amount);
        self.total = self.row_total();
        self.updated_at = Some(now);
    }

    /// 按新金属单价重算, 返回是否有字段变化
    pub fn reprice(&mut self, rate: &BigDecimal, now: DateTime<Utc>) -> bool {
        let rate_per_gram = round2(rate);
        let total_metal = round2(&(&self.grams * &rate_per_gram));
        let total = round2(&(&total_metal + &self.making_charges + &self.total_diamond_amount));

        let changed = rate_per_gram != self.rate_per_gram
            || total_metal != self.total_metal
            || total != self.total;
        if changed {
            self.rate_per_gram = rate_per_gram;
            self.total_metal = total_metal;
            self.total = total;
            self.updated_at = Some(now);
        }
        changed
    }

    fn is_complete(&self) -> bool {
        !self.purity.trim().is_empty() && !self.grams.is_zero() && !self.rate_per_gram.is_zero()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total_diamond_amount: BigDecimal,
    #[serde(default, deserialize_with = "money::or_default")]
    pub metal_summary: Vec<MetalSummaryRow>,
}

/// 完整报价单 (内联存储组装后 / 对象存储中的 JSON 均为此结构)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub quotation_id: String,
    #[serde(default)]
    pub identification: Identification,
    #[serde(default)]
    pub metal_items: Vec<MetalItem>,
    #[serde(default)]
    pub diamond_items: Vec<DiamondItem>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(deserialize_with = "lenient_date")]
    pub quotation_date: DateTime<Utc>,
}

/// 钻石明细合计 (两位小数)
pub fn diamond_total(items: &[DiamondItem]) -> BigDecimal {
    let sum = items
        .iter()
        .fold(BigDecimal::zero(), |acc, item| acc + &item.total);
    round2(&sum)
}

impl Quotation {
    /// 模糊搜索: 报价编号 / SKU / 分类 / 金属成色, 不区分大小写
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [
            self.quotation_id.as_str(),
            self.identification.id_sku.as_str(),
            self.identification.category.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&term))
            || self
                .metal_items
                .iter()
                .any(|m| m.purity.to_lowercase().contains(&term))
    }
}

/// 保存报价请求体
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQuotationRequest {
    #[serde(default)]
    pub identification: Option<Identification>,
    #[serde(default)]
    pub metal_items: Option<Vec<MetalItem>>,
    #[serde(default)]
    pub diamond_items: Option<Vec<DiamondItem>>,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default, deserialize_with = "lenient_date_opt")]
    pub quotation_date: Option<DateTime<Utc>>,
}

impl SaveQuotationRequest {
    /// 必填校验: idSku / metalItems / summary, 且 metalSummary 至少一行
    pub fn validate(&self) -> Result<(), AppError> {
        let has_sku = self
            .identification
            .as_ref()
            .is_some_and(|i| !i.id_sku.trim().is_empty());
        if !has_sku || self.metal_items.is_none() || self.summary.is_none() {
            return Err(AppError::validation(
                "Invalid quotation: idSku, metalItems, and summary are required",
            ));
        }
        if self.summary.as_ref().is_some_and(|s| s.metal_summary.is_empty()) {
            return Err(AppError::validation(
                "Invalid quotation: At least one metalSummary item is required",
            ));
        }
        Ok(())
    }

    /// 生成待保存的报价单: 钻石形状统一大写, 丢弃不完整的明细行
    pub fn into_quotation(self, quotation_id: String, now: DateTime<Utc>) -> Result<Quotation, AppError> {
        self.validate()?;

        let mut diamond_items = self.diamond_items.unwrap_or_default();
        for item in diamond_items.iter_mut() {
            item.shape = item.shape.trim().to_uppercase();
        }

        let metal_items = keep_complete(self.metal_items.unwrap_or_default(), MetalItem::is_complete, &quotation_id, "metalItems");
        let diamond_items = keep_complete(diamond_items, DiamondItem::is_complete, &quotation_id, "diamondItems");

        let mut summary = self.summary.unwrap_or_default();
        summary.metal_summary = keep_complete(
            summary.metal_summary,
            MetalSummaryRow::is_complete,
            &quotation_id,
            "metalSummary",
        );

        Ok(Quotation {
            quotation_id,
            identification: self.identification.unwrap_or_default(),
            metal_items,
            diamond_items,
            summary,
            quotation_date: self.quotation_date.unwrap_or(now),
        })
    }
}

fn keep_complete<T>(items: Vec<T>, complete: fn(&T) -> bool, quotation_id: &str, what: &str) -> Vec<T> {
    let before = items.len();
    let kept: Vec<T> = items.into_iter().filter(|item| complete(item)).collect();
    if kept.len() < before {
        tracing::warn!(
            "Quotation {}: dropped {} incomplete {} line(s)",
            quotation_id,
            before - kept.len(),
            what
        );
    }
    kept
}

/// 解析日期: RFC3339 时间戳, 或 `YYYY-MM-DD` (按 UTC 零点)
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn lenient_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date(&s).ok_or_else(|| D::Error::custom(format!("invalid date: {}", s)))
}

fn lenient_date_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_date(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid date: {}", s))),
    }
}
