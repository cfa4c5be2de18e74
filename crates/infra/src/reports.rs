//! Report aggregation over the sale and charge ledgers (read-only).

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use stockroom_accounting::{ItemRevenue, ProfitReport, ReportingPeriod, TopItemsQuery};
use stockroom_core::DomainError;

use crate::store::{ReportSource, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ReportService {
    source: Arc<dyn ReportSource>,
}

impl ReportService {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        Self { source }
    }

    /// Revenue, expenses and profit for one calendar month (UTC).
    #[instrument(skip(self), err)]
    pub async fn profit_for_period(&self, month: u32, year: i32) -> Result<ProfitReport, ReportError> {
        let period = ReportingPeriod::month(year, month)?;
        let revenue = self.source.revenue_between(&period).await?;
        let expenses = self.source.expenses_between(&period).await?;
        Ok(ProfitReport::from_totals(revenue, expenses))
    }

    /// Items ranked by revenue between two `YYYY-MM-DD` dates, both inclusive.
    ///
    /// Items without sales in the range are included with zero revenue.
    #[instrument(skip(self), err)]
    pub async fn top_items(
        &self,
        start_date: &str,
        end_date: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ItemRevenue>, ReportError> {
        let period = ReportingPeriod::parse_days(start_date, end_date)?;
        let query = TopItemsQuery::new(period, limit)?;
        Ok(self.source.top_items(&query).await?)
    }
}
