use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::images::ImageHost;
use crate::db::{QuotationHeader, QuotationRepository, StorageMode};
use crate::error::{AppError, ResultExt};
use crate::models::quotation::parse_date;
use crate::models::{Quotation, SaveQuotationRequest};

/// `GET /api/metadata` 查询参数
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub start_after: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationPage {
    pub quotations: Vec<Quotation>,
    pub total_count: usize,
    pub has_next_page: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub message: String,
    pub quotation_id: String,
    pub storage: StorageMode,
}

/// 解析后的过滤条件
struct Filter {
    category: Option<String>,
    sku: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Filter {
    fn from_query(query: &ListQuery) -> Result<Self, AppError> {
        let parse = |value: &Option<String>, name: &str| -> Result<Option<DateTime<Utc>>, AppError> {
            match non_empty(value) {
                None => Ok(None),
                Some(s) => parse_date(&s)
                    .map(Some)
                    .ok_or_else(|| AppError::validation(format!("Invalid {}: {}", name, s))),
            }
        };

        let from = parse(&query.date_from, "dateFrom")?;
        // dateTo 包含当天: 截止到 23:59:59.999
        let to = parse(&query.date_to, "dateTo")?.and_then(|d| {
            d.date_naive()
                .and_hms_milli_opt(23, 59, 59, 999)
                .map(|end| end.and_utc())
        });

        Ok(Self {
            category: non_empty(&query.category),
            sku: non_empty(&query.sku),
            from,
            to,
        })
    }

    fn accepts(&self, header: &QuotationHeader) -> bool {
        if let Some(category) = &self.category {
            if &header.identification.category != category {
                return false;
            }
        }
        if let Some(sku) = &self.sku {
            if &header.identification.id_sku != sku {
                return false;
            }
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(date) = header.quotation_date else {
                return false;
            };
            if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
                return false;
            }
        }
        true
    }
}

/// 游标分页: 从 `start_after` 之后开始取 `limit` 条, 返回 (本页, 是否还有下一页)
fn paginate<T>(items: Vec<T>, id_of: impl Fn(&T) -> &str, start_after: Option<&str>, limit: Option<usize>) -> (Vec<T>, bool) {
    let start = start_after
        .and_then(|cursor| items.iter().position(|item| id_of(item) == cursor))
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let remaining = items.len().saturating_sub(start);
    let take = limit.unwrap_or(remaining).min(remaining);
    let has_next_page = remaining > take;
    let page = items.into_iter().skip(start).take(take).collect();
    (page, has_next_page)
}

/// 报价单增删查
#[derive(Clone)]
pub struct QuotationService {
    repo: QuotationRepository,
    images: Arc<dyn ImageHost>,
}

impl QuotationService {
    pub fn new(repo: QuotationRepository, images: Arc<dyn ImageHost>) -> Self {
        Self { repo, images }
    }

    pub async fn save(&self, request: SaveQuotationRequest) -> Result<SaveOutcome, AppError> {
        // 校验失败不消耗编号
        request.validate()?;

        let quotation_id = self.repo.next_id().await.or_fail("Failed to save quotation")?;
        if self
            .repo
            .header(&quotation_id)
            .await
            .or_fail("Failed to save quotation")?
            .is_some()
        {
            return Err(AppError::validation("Quotation ID already exists"));
        }

        let quotation = request.into_quotation(quotation_id.clone(), Utc::now())?;
        let storage = self.repo.save(&quotation).await.or_fail("Failed to save quotation")?;
        tracing::info!("Quotation {} saved ({:?})", quotation_id, storage);

        Ok(SaveOutcome {
            message: format!("Quotation {} saved successfully", quotation_id),
            quotation_id,
            storage,
        })
    }

    pub async fn get(&self, quotation_id: &str) -> Result<Quotation, AppError> {
        self.repo
            .get(quotation_id)
            .await
            .or_fail("Failed to load quotation")?
            .ok_or_else(|| AppError::not_found("Quotation not found"))
    }

    /// 按日期倒序列出报价单, 支持过滤、搜索和游标分页
    pub async fn list(&self, query: &ListQuery) -> Result<QuotationPage, AppError> {
        let filter = Filter::from_query(query)?;

        // 1. 头文档过滤 + 排序
        let mut headers = self.repo.headers().await.or_fail("Failed to load metadata summaries")?;
        headers.retain(|h| filter.accepts(h));
        headers.sort_by(|a, b| {
            b.quotation_date
                .cmp(&a.quotation_date)
                .then_with(|| b.quotation_id.cmp(&a.quotation_id))
        });

        let start_after = non_empty(&query.start_after);
        let search = non_empty(&query.search);

        // 2. 搜索需要明细 (金属成色), 先全部加载再分页
        if let Some(term) = search {
            let mut matched = self.load_all(&headers).await;
            matched.retain(|q| q.matches_search(&term));
            let total_count = matched.len();
            let (quotations, has_next_page) =
                paginate(matched, |q| q.quotation_id.as_str(), start_after.as_deref(), query.limit);
            return Ok(QuotationPage {
                quotations,
                total_count,
                has_next_page,
            });
        }

        // 3. 无搜索: 先分页, 只加载本页
        let total_count = headers.len();
        let (page, has_next_page) =
            paginate(headers, |h| h.quotation_id.as_str(), start_after.as_deref(), query.limit);
        Ok(QuotationPage {
            quotations: self.load_all(&page).await,
            total_count,
            has_next_page,
        })
    }

    /// 加载失败 (例如对象存储读不到) 的报价单跳过并记日志
    async fn load_all(&self, headers: &[QuotationHeader]) -> Vec<Quotation> {
        let loaded = join_all(headers.iter().map(|h| self.repo.load(h))).await;
        headers
            .iter()
            .zip(loaded)
            .filter_map(|(header, result)| match result {
                Ok(q) => Some(q),
                Err(e) => {
                    tracing::error!("Error loading quotation {}, skipping: {}", header.quotation_id, e);
                    None
                }
            })
            .collect()
    }

    /// 删除报价单: 先尽力删除图片, 再删除明细和头文档
    pub async fn delete(&self, quotation_id: &str) -> Result<(), AppError> {
        let header = self
            .repo
            .header(quotation_id)
            .await
            .or_fail("Failed to delete quotation")?
            .ok_or_else(|| AppError::not_found("Quotation not found"))?;

        let images = match self.repo.load(&header).await {
            Ok(q) => q.identification.images,
            Err(e) => {
                tracing::warn!("Quotation {}: could not load images before delete: {}", quotation_id, e);
                header.identification.images.clone()
            }
        };

        let results = join_all(images.iter().map(|url| self.images.delete(url))).await;
        for (url, result) in images.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("Quotation {}: failed to delete image {}: {}", quotation_id, url, e);
            }
        }

        self.repo.delete(&header).await.or_fail("Failed to delete quotation")?;
        tracing::info!("Quotation {} deleted", quotation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_after_cursor() {
        let ids = vec!["Q-5", "Q-4", "Q-3", "Q-2", "Q-1"];
        let (page, more) = paginate(ids.clone(), |s| *s, None, Some(2));
        assert_eq!(page, vec!["Q-5", "Q-4"]);
        assert!(more);

        let (page, more) = paginate(ids.clone(), |s| *s, Some("Q-4"), Some(2));
        assert_eq!(page, vec!["Q-3", "Q-2"]);
        assert!(more);

        let (page, more) = paginate(ids.clone(), |s| *s, Some("Q-2"), Some(2));
        assert_eq!(page, vec!["Q-1"]);
        assert!(!more);

        // 未知游标从头开始
        let (page, more) = paginate(ids, |s| *s, Some("Q-9"), None);
        assert_eq!(page.len(), 5);
        assert!(!more);
    }

    #[test]
    fn date_to_covers_whole_day() {
        let query = ListQuery {
            date_from: Some("2024-03-01".into()),
            date_to: Some("2024-03-01".into()),
            ..Default::default()
        };
        let filter = Filter::from_query(&query).unwrap();
        assert_eq!(filter.to.unwrap().to_rfc3339(), "2024-03-01T23:59:59.999+00:00");

        let bad = ListQuery {
            date_from: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(Filter::from_query(&bad).is_err());
    }
}
