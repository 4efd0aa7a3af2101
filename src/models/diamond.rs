use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::money::{self, round2};
use crate::error::AppError;

/// 目录中的标准形状 (也允许自由文本)
pub const VALID_SHAPES: [&str; 7] = ["ROUND", "OVAL", "PEAR", "EMERALD", "PRINCESS", "CUSHION", "ASSCHER"];

/// 钻石尺寸: 圆钻为数字, 异形钻为 "6x4" 这类字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Millimeters {
    Number(f64),
    Text(String),
}

impl Default for Millimeters {
    fn default() -> Self {
        Millimeters::Text(String::new())
    }
}

impl Millimeters {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Millimeters::Number(_))
    }

    /// 手工录入的 "other" 尺寸, 永远不参与目录价格联动
    pub fn is_other(&self) -> bool {
        matches!(self, Millimeters::Text(s) if s.trim().eq_ignore_ascii_case("other"))
    }

    /// 归一化后用于比较: 去空白, 按 x 拆分, 每段保留两位小数, 以 " x " 连接
    ///
    /// 任意一段不是数字时返回 None (不可匹配)。
    pub fn normalized(&self) -> Option<String> {
        match self {
            Millimeters::Number(n) if n.is_finite() => {
                BigDecimal::from_str(&n.to_string()).ok().map(|d| round2(&d).to_string())
            }
            Millimeters::Number(_) => None,
            Millimeters::Text(s) => {
                let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
                let parts = compact
                    .split(|c: char| c == 'x' || c == 'X')
                    .map(|part| BigDecimal::from_str(part).ok().map(|d| round2(&d).to_string()))
                    .collect::<Option<Vec<_>>>()?;
                Some(parts.join(" x "))
            }
        }
    }
}

impl fmt::Display for Millimeters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Millimeters::Number(n) => write!(f, "{}", n),
            Millimeters::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 钻石目录条目 (diamonds 集合)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiamondVariant {
    pub id: i64,
    #[serde(rename = "SHAPE")]
    pub shape: String,
    #[serde(rename = "MM")]
    pub mm: Millimeters,
    #[serde(rename = "PRICE/CT", deserialize_with = "money::lenient")]
    pub price_per_carat: BigDecimal,
    #[serde(rename = "MM & SHAPE", default)]
    pub display_label: String,
}

impl DiamondVariant {
    pub fn new(id: i64, input: DiamondInput) -> Self {
        let display_label = display_label(&input.shape, &input.mm);
        Self {
            id,
            shape: input.shape,
            mm: input.mm,
            price_per_carat: round2(&input.price_per_carat),
            display_label,
        }
    }

    /// 目录条目是否对应某个报价钻石明细 (形状不区分大小写 + 尺寸归一化相等)
    pub fn matches(&self, shape: &str, mm: &Millimeters) -> bool {
        if shape.trim().eq_ignore_ascii_case("other") || mm.is_other() {
            return false;
        }
        if !shape.trim().eq_ignore_ascii_case(&self.shape) {
            return false;
        }
        match (mm.normalized(), self.mm.normalized()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// `"{shape}-{mm} MM"`
pub fn display_label(shape: &str, mm: &Millimeters) -> String {
    format!("{}-{} MM", shape, mm)
}

/// 校验后的目录写入参数
#[derive(Debug, Clone, PartialEq)]
pub struct DiamondInput {
    pub shape: String,
    pub mm: Millimeters,
    pub price_per_carat: BigDecimal,
}

/// 请求体: `{SHAPE, MM, "PRICE/CT"}`, 字段先按原始 JSON 接收再逐项校验
#[derive(Debug, Default, Deserialize)]
pub struct DiamondPayload {
    #[serde(rename = "SHAPE", default)]
    pub shape: Option<Value>,
    #[serde(rename = "MM", default)]
    pub mm: Option<Value>,
    #[serde(rename = "PRICE/CT", default)]
    pub price_per_carat: Option<Value>,
}

const INVALID_INPUT: &str =
    "Invalid input: SHAPE, MM, and PRICE/CT are required, and PRICE/CT must be a number";

impl DiamondPayload {
    pub fn validate(self) -> Result<DiamondInput, AppError> {
        let shape = match &self.shape {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_uppercase(),
            _ => return Err(AppError::validation(INVALID_INPUT)),
        };

        let mm = match self.mm {
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) => Millimeters::Number(f),
                None => return Err(AppError::validation(INVALID_INPUT)),
            },
            Some(Value::String(s)) => Millimeters::Text(s),
            _ => return Err(AppError::validation(INVALID_INPUT)),
        };

        let price_per_carat = self
            .price_per_carat
            .as_ref()
            .and_then(money::strict_number)
            .ok_or_else(|| AppError::validation(INVALID_INPUT))?;
        if price_per_carat < BigDecimal::zero() {
            return Err(AppError::validation("PRICE/CT must not be negative"));
        }

        if shape == "ROUND" && !mm.is_numeric() {
            return Err(AppError::validation("MM must be a number for ROUND shape"));
        }

        if !VALID_SHAPES.contains(&shape.as_str()) {
            tracing::debug!("Diamond shape {} is not in the standard list", shape);
        }

        Ok(DiamondInput {
            shape,
            mm,
            price_per_carat,
        })
    }
}
