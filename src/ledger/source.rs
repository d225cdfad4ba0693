//! Ledger source abstraction
//!
//! The execution engine owns the ledger; this crate only reads it. Fetches
//! are wrapped with a bounded timeout and a small number of retries.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::classifier::{classify_ledger, classify_opportunities};
use super::raw::{ClassifierDiagnostics, RawOpportunityRow, RawTradeRow};
use crate::types::{AggregateSnapshot, OpportunityWindow, TradeRecord};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ledger fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("ledger fetch failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<LedgerError>,
    },
}

/// Read-only access to the trade ledger and its cached rollup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// All trade rows, in any order
    async fn load_trades(&self) -> Result<Vec<RawTradeRow>, LedgerError>;

    /// Cached aggregate snapshot, if the external rollup exists
    async fn load_snapshot(&self) -> Result<Option<AggregateSnapshot>, LedgerError>;

    /// Detected opportunities (possibly a truncated sample)
    async fn load_opportunities(&self) -> Result<Vec<RawOpportunityRow>, LedgerError>;
}

/// Timeout/retry policy for ledger fetches
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Run `op` with a per-attempt timeout, retrying `policy.retries` times
/// with linear backoff.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &FetchPolicy,
    what: &str,
    mut op: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let attempts = policy.retries + 1;
    let mut last = LedgerError::Timeout(policy.timeout);

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!(what, attempt, attempts, error = %e, "Ledger fetch failed");
                last = e;
            }
            Err(_) => {
                warn!(
                    what,
                    attempt,
                    attempts,
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "Ledger fetch timed out"
                );
                last = LedgerError::Timeout(policy.timeout);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(policy.backoff * attempt).await;
        }
    }

    Err(LedgerError::Exhausted {
        attempts,
        last: Box::new(last),
    })
}

/// Point-in-time view of the ledger, classified
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    pub trades: Vec<TradeRecord>,
    pub snapshot: Option<AggregateSnapshot>,
    pub opportunities: OpportunityWindow,
    pub diagnostics: ClassifierDiagnostics,
}

impl LedgerView {
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty() && self.snapshot.is_none()
    }
}

/// Fetch and classify everything the metrics and tax views need.
///
/// Trades are required. A failing snapshot or opportunity fetch degrades to
/// "absent" so the dashboard still renders recomputed numbers.
pub async fn load_ledger(
    source: &dyn LedgerSource,
    policy: &FetchPolicy,
) -> Result<LedgerView, LedgerError> {
    let rows = fetch_with_retry(policy, "trades", || source.load_trades()).await?;

    let snapshot = match fetch_with_retry(policy, "snapshot", || source.load_snapshot()).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Snapshot unavailable, using recomputed metrics only");
            None
        }
    };

    let opportunity_rows =
        match fetch_with_retry(policy, "opportunities", || source.load_opportunities()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Opportunities unavailable");
                Vec::new()
            }
        };

    let (trades, mut diagnostics) = classify_ledger(&rows);
    let total_count = snapshot
        .as_ref()
        .and_then(|s| s.total_opportunities_seen);
    let (opportunities, opp_diag) = classify_opportunities(&opportunity_rows, total_count);
    diagnostics.merge(&opp_diag);

    info!(
        trades = trades.len(),
        opportunities = opportunities.records.len(),
        has_snapshot = snapshot.is_some(),
        coerced = diagnostics.coerced_fields(),
        "Ledger loaded"
    );

    Ok(LedgerView {
        trades,
        snapshot,
        opportunities,
        diagnostics,
    })
}
