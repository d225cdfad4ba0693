//! Dashboard metrics
//!
//! Reconciles the cached snapshot against the ledger, then derives the
//! balance card, win/loss distribution and opportunity funnel.

pub mod balance;
pub mod funnel;
pub mod reconciler;

pub use balance::{
    distribution, execution_rate, summarize, win_rate, BalanceSummary, PnlBucket,
    StartingBalances, WinLossDistribution,
};
pub use funnel::{analyze, conversion_rate, is_real_signal, FunnelSummary, StrategyFunnelRow};
pub use reconciler::{
    merge, merge_fees, reconcile, LedgerTotals, MetricSource, Provenance, Reconciled,
    ReconciledMetrics, ReconcilerPolicy, TradeCounts,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{ClassifierDiagnostics, LedgerView};
use crate::tax::{strategy_breakdown, FeePolicy, StrategyBreakdown};

/// Everything the metrics pages render, computed fresh per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub reconciled: ReconciledMetrics,
    pub balance: BalanceSummary,
    pub distribution: WinLossDistribution,
    pub funnel: FunnelSummary,
    pub by_strategy: Vec<StrategyBreakdown>,
    pub diagnostics: ClassifierDiagnostics,
}

/// Settings the metrics view needs
#[derive(Debug, Clone, Default)]
pub struct MetricsSettings {
    pub reconciler: ReconcilerPolicy,
    pub balances: StartingBalances,
    pub fees: FeePolicy,
}

/// Build the full metrics report from a ledger view
pub fn build_report(
    view: &LedgerView,
    settings: &MetricsSettings,
    now: DateTime<Utc>,
) -> MetricsReport {
    let reconciled = reconcile(&view.trades, view.snapshot.as_ref(), &settings.reconciler);
    let cached_win_rate = view
        .snapshot
        .as_ref()
        .map(|s| s.cached_win_rate())
        .unwrap_or(0.0);
    let balance = summarize(&reconciled, &settings.balances, cached_win_rate);
    let distribution = distribution(&view.trades, balance.starting_balance);
    let funnel = analyze(&view.opportunities, &view.trades);
    let lots = crate::tax::build_lots(view.trades.iter(), &settings.fees);
    let by_strategy = strategy_breakdown(&lots);

    MetricsReport {
        generated_at: now,
        reconciled,
        balance,
        distribution,
        funnel,
        by_strategy,
        diagnostics: view.diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AggregateSnapshot, OpportunityRecord, OpportunityWindow, Platform, TradeOutcome,
        TradeRecord,
    };

    #[test]
    fn report_ties_components_together() {
        let view = LedgerView {
            trades: vec![
                TradeRecord {
                    outcome: TradeOutcome::Won,
                    actual_profit_usd: 10.0,
                    strategy_type: "cross".to_string(),
                    ..Default::default()
                },
                TradeRecord {
                    outcome: TradeOutcome::Lost,
                    actual_profit_usd: -4.0,
                    strategy_type: "cross".to_string(),
                    ..Default::default()
                },
                TradeRecord::default(),
            ],
            snapshot: Some(AggregateSnapshot {
                total_pnl: Some(999.0),
                ..Default::default()
            }),
            opportunities: OpportunityWindow {
                records: vec![OpportunityRecord {
                    profit_percent: 1.0,
                    ..Default::default()
                }],
                total_count: Some(6),
            },
            diagnostics: ClassifierDiagnostics::default(),
        };
        let settings = MetricsSettings {
            balances: StartingBalances::uniform(100.0, &[Platform::Polymarket]),
            ..Default::default()
        };
        let report = build_report(&view, &settings, Utc::now());

        assert_eq!(report.balance.net_pnl, 6.0);
        assert_eq!(report.reconciled.net_pnl.cached, Some(999.0));
        assert_eq!(report.balance.current_balance, 106.0);
        assert_eq!(report.funnel.total_seen, 6);
        assert!((report.funnel.conversion_rate - 50.0).abs() < 1e-9);
        assert_eq!(report.distribution.wins, 1);
        assert_eq!(report.by_strategy[0].strategy, "cross");
        assert_eq!(report.by_strategy[0].win_rate, 50.0);
    }
}
