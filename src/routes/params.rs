use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let size = self.size.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * size;
        (page, size, offset)
    }
}

/// Inclusive creation-time window: `[start 00:00:00, end 23:59:59]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderRangeQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub start_date: String,
    pub end_date: String,
}

impl OrderRangeQuery {
    pub fn date_range(&self) -> AppResult<DateRange> {
        let start = parse_date(&self.start_date)?;
        let end = parse_date(&self.end_date)?;
        if start > end {
            return Err(AppError::BadRequest("startDate is after endDate".into()));
        }
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
            .ok_or_else(|| AppError::BadRequest("invalid date range".into()))?;
        Ok(DateRange {
            start: start.and_time(NaiveTime::MIN).and_utc(),
            end: end.and_time(end_of_day).and_utc(),
        })
    }
}

fn parse_date(input: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date {input}, expected YYYY-MM-DD")))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub username: String,
}
