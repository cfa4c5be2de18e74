//! Reporting periods and report shapes.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use stockroom_core::{DomainError, DomainResult, ItemId, Money};

pub const MIN_REPORT_YEAR: i32 = 2000;
pub const MAX_REPORT_YEAR: i32 = 2100;

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReportingPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReportingPeriod {
    /// A calendar month.
    pub fn month(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation("month must be between 1 and 12"));
        }
        if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&year) {
            return Err(DomainError::validation(format!(
                "year must be between {MIN_REPORT_YEAR} and {MAX_REPORT_YEAR}"
            )));
        }

        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DomainError::validation("invalid month"))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| DomainError::validation("invalid month"))?;

        Ok(Self {
            start: midnight(first),
            end: midnight(next),
        })
    }

    /// Whole days from `first` through `last`, both inclusive.
    pub fn days(first: NaiveDate, last: NaiveDate) -> DomainResult<Self> {
        if first > last {
            return Err(DomainError::validation("start_date must not be after end_date"));
        }
        let after_last = last
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| DomainError::validation("end_date out of range"))?;
        Ok(Self {
            start: midnight(first),
            end: midnight(after_last),
        })
    }

    /// Parse a day range from `YYYY-MM-DD` strings.
    pub fn parse_days(first: &str, last: &str) -> DomainResult<Self> {
        let parse = |field: &str, s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| DomainError::validation(format!("{field} must be formatted as YYYY-MM-DD")))
        };
        Self::days(parse("start_date", first)?, parse("end_date", last)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// Revenue, expenses and their difference over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfitReport {
    pub revenue: Money,
    pub expenses: Money,
    /// May be negative.
    pub profit: Decimal,
}

impl ProfitReport {
    pub fn from_totals(revenue: Money, expenses: Money) -> Self {
        Self {
            revenue,
            expenses,
            profit: revenue.amount() - expenses.amount(),
        }
    }
}

/// Revenue attributed to one stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRevenue {
    pub id: ItemId,
    pub name: String,
    pub revenue: Money,
}

pub const DEFAULT_TOP_ITEMS: usize = 5;
pub const MAX_TOP_ITEMS: usize = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TopItemsQuery {
    pub period: ReportingPeriod,
    pub limit: usize,
}

impl TopItemsQuery {
    pub fn new(period: ReportingPeriod, limit: Option<usize>) -> DomainResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_TOP_ITEMS);
        if limit == 0 || limit > MAX_TOP_ITEMS {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {MAX_TOP_ITEMS}"
            )));
        }
        Ok(Self { period, limit })
    }
}

/// Order by revenue descending, ties by item id ascending, then truncate.
pub fn rank_items(mut items: Vec<ItemRevenue>, limit: usize) -> Vec<ItemRevenue> {
    items.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.id.cmp(&b.id)));
    items.truncate(limit);
    items
}
