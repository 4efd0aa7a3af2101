use bigdecimal::{BigDecimal, Zero};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// 金额统一保留两位小数 (四舍五入)
pub fn round2(value: &BigDecimal) -> BigDecimal {
    value.round(2).with_scale(2)
}

/// 把 JSON 值解析为十进制数
///
/// 前端提交的金额有时是数字, 有时是 `toFixed` 之后的字符串;
/// `null` / 缺失 / 空串按 0 处理, 其它类型返回 None。
pub fn parse_decimal(value: Option<&Value>) -> Option<BigDecimal> {
    match value {
        None | Some(Value::Null) => Some(BigDecimal::zero()),
        Some(Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok(),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Some(BigDecimal::zero())
            } else {
                BigDecimal::from_str(s).ok()
            }
        }
        Some(_) => None,
    }
}

/// serde 宽松反序列化: 数字 / 数字字符串 / null 均可
pub fn lenient<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    parse_decimal(value.as_ref())
        .ok_or_else(|| D::Error::custom(format!("invalid decimal value: {:?}", value)))
}

/// serde: 显式 `null` 与缺失一样取默认值 (前端未选择的下拉框会提交 null)
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// 严格解析: 只接受 JSON 数字 (价格类输入)
pub fn strict_number(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
