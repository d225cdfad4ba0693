//! Dashboard Module
//!
//! HTTP API for the metrics and tax pages. Every request reads the ledger
//! fresh; nothing is cached between requests.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::ledger::{load_ledger, FetchPolicy, LedgerError, LedgerSource, LedgerView};
use crate::metrics::MetricsSettings;
use crate::tax::{ResolvedTaxQuery, TaxEngine, TaxLot, TaxQuery};

/// Shared handler state
pub struct DashboardState {
    pub source: Arc<dyn LedgerSource>,
    pub fetch: FetchPolicy,
    pub metrics: MetricsSettings,
    pub tax: TaxEngine,
    /// Acquisition to disposal gap on Form 8949 rows
    pub resolution_offset: chrono::Duration,
}

impl DashboardState {
    pub fn new(
        source: Arc<dyn LedgerSource>,
        fetch: FetchPolicy,
        metrics: MetricsSettings,
        tax: TaxEngine,
        resolution_offset: chrono::Duration,
    ) -> Self {
        Self {
            source,
            fetch,
            metrics,
            tax,
            resolution_offset,
        }
    }

    pub async fn view(&self) -> Result<LedgerView, LedgerError> {
        load_ledger(self.source.as_ref(), &self.fetch).await
    }

    /// Filtered tax lots for an export
    pub async fn tax_lots(
        &self,
        query: &TaxQuery,
        now: DateTime<Utc>,
    ) -> Result<(ResolvedTaxQuery, Vec<TaxLot>), LedgerError> {
        let view = self.view().await?;
        let resolved = query.resolve(now);
        let lots = self.tax.lots_for(&view.trades, &resolved);
        Ok((resolved, lots))
    }
}
