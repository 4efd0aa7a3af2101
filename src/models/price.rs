use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::money;
use crate::error::AppError;

/// 金属成色 -> 每克单价, 全局只有一份, 更新时整表替换
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetalPriceTable(IndexMap<String, BigDecimal>);

impl MetalPriceTable {
    /// 从请求体构建: 必须是对象, 每个值都是非负数字
    pub fn from_payload(payload: Value) -> Result<Self, AppError> {
        let Value::Object(map) = payload else {
            return Err(AppError::validation("Invalid input: newPrices must be an object"));
        };

        let mut rates = IndexMap::with_capacity(map.len());
        for (purity, value) in map {
            let rate = money::strict_number(&value).ok_or_else(|| {
                AppError::validation(format!("Invalid price for {}: must be a number", purity))
            })?;
            if rate < BigDecimal::zero() {
                return Err(AppError::validation(format!(
                    "Invalid price for {}: must not be negative",
                    purity
                )));
            }
            rates.insert(purity, rate);
        }
        Ok(Self(rates))
    }

    pub fn rate(&self, purity: &str) -> Option<&BigDecimal> {
        self.0.get(purity)
    }

    pub fn contains(&self, purity: &str) -> bool {
        self.0.contains_key(purity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn purities(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, BigDecimal)> for MetalPriceTable {
    fn from_iter<I: IntoIterator<Item = (String, BigDecimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
