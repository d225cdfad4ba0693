//! Metrics Reconciler
//!
//! Two sources can answer "what is our net P&L / fee total / trade count":
//! the cached [`AggregateSnapshot`] rolled up by an external job, and a
//! recomputation over the live trade rows. Each metric is resolved by a
//! pure merge over [`MetricSource`] candidates:
//!
//! 1. a recomputed value wins (freshness)
//! 2. otherwise the cached value
//! 3. otherwise the type default (0)
//!
//! Fee totals get an extra sanity bound because the cached rollup is known
//! to inflate them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{AggregateSnapshot, TradeOutcome, TradeRecord};

/// Fee-sanity and divergence-logging knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerPolicy {
    /// Reasonable fee ceiling per trade (USD)
    pub fee_cap_per_trade: f64,
    /// Minimum fee ceiling regardless of trade count (USD)
    pub fee_cap_floor: f64,
    /// Absolute difference below which sources are considered in agreement
    pub divergence_tolerance: f64,
}

impl Default for ReconcilerPolicy {
    fn default() -> Self {
        Self {
            fee_cap_per_trade: 50.0,
            fee_cap_floor: 100.0,
            divergence_tolerance: 0.01,
        }
    }
}

impl ReconcilerPolicy {
    /// `max(trade_count × per_trade, floor)`
    pub fn max_reasonable_fees(&self, trade_count: u64) -> f64 {
        (trade_count as f64 * self.fee_cap_per_trade).max(self.fee_cap_floor)
    }
}

/// One candidate value for a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricSource<T> {
    Cached(T),
    Recomputed(T),
    Unavailable,
}

impl<T> MetricSource<T> {
    pub fn cached(value: Option<T>) -> Self {
        value.map_or(MetricSource::Unavailable, MetricSource::Cached)
    }

    pub fn recomputed(value: Option<T>) -> Self {
        value.map_or(MetricSource::Unavailable, MetricSource::Recomputed)
    }
}

/// Which source a reconciled value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Cached,
    Recomputed,
    Default,
}

/// A reconciled metric plus the inputs it was chosen from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reconciled<T> {
    pub value: T,
    pub provenance: Provenance,
    pub cached: Option<T>,
    pub recomputed: Option<T>,
}

fn split<T: Copy>(candidates: &[MetricSource<T>]) -> (Option<T>, Option<T>) {
    let mut cached = None;
    let mut recomputed = None;
    for candidate in candidates {
        match *candidate {
            MetricSource::Cached(v) => cached = cached.or(Some(v)),
            MetricSource::Recomputed(v) => recomputed = recomputed.or(Some(v)),
            MetricSource::Unavailable => {}
        }
    }
    (cached, recomputed)
}

/// Freshness-first merge: recomputed, then cached, then `T::default()`.
pub fn merge<T: Copy + Default>(candidates: &[MetricSource<T>]) -> Reconciled<T> {
    let (cached, recomputed) = split(candidates);
    let (value, provenance) = match (recomputed, cached) {
        (Some(r), _) => (r, Provenance::Recomputed),
        (None, Some(c)) => (c, Provenance::Cached),
        (None, None) => (T::default(), Provenance::Default),
    };
    Reconciled {
        value,
        provenance,
        cached,
        recomputed,
    }
}

/// Fee merge with the corruption guard.
///
/// When the cached total exceeds `max(trade_count × cap, floor)` and the
/// recomputed total is lower, the recomputed total is used. Otherwise a
/// non-zero recomputed total wins, and the cached total is the last
/// fallback.
pub fn merge_fees(
    candidates: &[MetricSource<f64>],
    trade_count: u64,
    policy: &ReconcilerPolicy,
) -> (Reconciled<f64>, bool) {
    let (cached, recomputed) = split(candidates);
    let max_reasonable = policy.max_reasonable_fees(trade_count);

    let mut overridden = false;
    let (value, provenance) = match (cached, recomputed) {
        (Some(c), Some(r)) if c > max_reasonable && r < c => {
            warn!(
                cached_fees = c,
                recomputed_fees = r,
                max_reasonable,
                trade_count,
                "Cached fee total exceeds sanity bound, using recomputed fees"
            );
            overridden = true;
            (r, Provenance::Recomputed)
        }
        (_, Some(r)) if r > 0.0 => (r, Provenance::Recomputed),
        (Some(c), _) => (c, Provenance::Cached),
        (None, Some(r)) => (r, Provenance::Recomputed),
        (None, None) => (0.0, Provenance::Default),
    };

    (
        Reconciled {
            value,
            provenance,
            cached,
            recomputed,
        },
        overridden,
    )
}

/// Trade counts, reconciled as one unit so `decided = wins + losses` holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeCounts {
    /// Executed trades (everything except failed executions)
    pub total: u64,
    pub winning: u64,
    pub losing: u64,
}

impl TradeCounts {
    pub fn decided(&self) -> u64 {
        self.winning + self.losing
    }
}

/// Everything recomputable from the live trade rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub counts: TradeCounts,
    pub pending: u64,
    pub failed_executions: u64,
    /// Σ actual profit over decided trades
    pub net_pnl: f64,
    /// Σ recorded fees over all trades
    pub total_fees: f64,
    /// Σ |actual profit| over lost trades
    pub total_losses: f64,
    /// Σ actual profit over won trades
    pub total_wins: f64,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
}

impl LedgerTotals {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let mut totals = LedgerTotals::default();
        for trade in trades {
            totals.total_fees += trade.recorded_fees();
            match trade.outcome {
                TradeOutcome::Pending => {
                    totals.pending += 1;
                    totals.counts.total += 1;
                }
                TradeOutcome::FailedExecution => totals.failed_executions += 1,
                TradeOutcome::Won | TradeOutcome::Lost => {
                    totals.counts.total += 1;
                    let profit = trade.actual_profit_usd;
                    totals.net_pnl += profit;
                    if trade.outcome == TradeOutcome::Won {
                        totals.counts.winning += 1;
                        totals.total_wins += profit;
                    } else {
                        totals.counts.losing += 1;
                        totals.total_losses += profit.abs();
                    }
                    totals.best_trade = Some(totals.best_trade.map_or(profit, |b| b.max(profit)));
                    totals.worst_trade =
                        Some(totals.worst_trade.map_or(profit, |w| w.min(profit)));
                }
            }
        }
        totals
    }
}

/// Reconciled figures for the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciledMetrics {
    pub net_pnl: Reconciled<f64>,
    pub counts: Reconciled<TradeCounts>,
    pub total_fees: Reconciled<f64>,
    /// True when the cached fee total was rejected by the sanity bound
    pub fee_override: bool,
    pub total_losses: Reconciled<f64>,
    pub best_trade: Reconciled<f64>,
    pub worst_trade: Reconciled<f64>,
    pub failed_executions: u64,
    pub pending_trades: u64,
}

impl ReconciledMetrics {
    pub fn decided_trades(&self) -> u64 {
        self.counts.value.decided()
    }
}

fn cached_counts(snapshot: &AggregateSnapshot) -> Option<TradeCounts> {
    if snapshot.total_trades.is_none()
        && snapshot.winning_trades.is_none()
        && snapshot.losing_trades.is_none()
    {
        return None;
    }
    let winning = snapshot.winning_trades.unwrap_or(0);
    let losing = snapshot.losing_trades.unwrap_or(0);
    Some(TradeCounts {
        total: snapshot.total_trades.unwrap_or(winning + losing),
        winning,
        losing,
    })
}

fn log_divergence(metric: &str, value: &Reconciled<f64>, tolerance: f64) {
    if let (Some(c), Some(r)) = (value.cached, value.recomputed) {
        if (c - r).abs() > tolerance {
            warn!(
                metric,
                cached = c,
                recomputed = r,
                chosen = ?value.provenance,
                "Snapshot diverges from ledger"
            );
        }
    }
}

/// Reconcile the snapshot against the live trade set.
///
/// Recomputed values are available whenever at least one trade row was
/// read; an empty ledger leaves only the snapshot.
pub fn reconcile(
    trades: &[TradeRecord],
    snapshot: Option<&AggregateSnapshot>,
    policy: &ReconcilerPolicy,
) -> ReconciledMetrics {
    let live = (!trades.is_empty()).then(|| LedgerTotals::from_trades(trades));

    let net_pnl = merge(&[
        MetricSource::cached(snapshot.and_then(|s| s.total_pnl)),
        MetricSource::recomputed(live.map(|t| t.net_pnl)),
    ]);
    log_divergence("net_pnl", &net_pnl, policy.divergence_tolerance);

    let counts = merge(&[
        MetricSource::cached(snapshot.and_then(cached_counts)),
        MetricSource::recomputed(live.map(|t| t.counts)),
    ]);
    if let (Some(c), Some(r)) = (counts.cached, counts.recomputed) {
        if c != r {
            warn!(cached = ?c, recomputed = ?r, "Snapshot trade counts diverge from ledger");
        }
    }

    let (total_fees, fee_override) = merge_fees(
        &[
            MetricSource::cached(snapshot.and_then(|s| s.total_fees_paid)),
            MetricSource::recomputed(live.map(|t| t.total_fees)),
        ],
        counts.value.total,
        policy,
    );
    if !fee_override {
        log_divergence("total_fees", &total_fees, policy.divergence_tolerance);
    }

    let total_losses = merge(&[MetricSource::recomputed(live.map(|t| t.total_losses))]);

    let best_trade = merge(&[
        MetricSource::cached(snapshot.and_then(|s| s.best_trade_profit)),
        MetricSource::recomputed(live.and_then(|t| t.best_trade)),
    ]);
    let worst_trade = merge(&[
        MetricSource::cached(snapshot.and_then(|s| s.worst_trade_loss)),
        MetricSource::recomputed(live.and_then(|t| t.worst_trade)),
    ]);

    ReconciledMetrics {
        net_pnl,
        counts,
        total_fees,
        fee_override,
        total_losses,
        best_trade,
        worst_trade,
        failed_executions: live.map(|t| t.failed_executions).unwrap_or(0),
        pending_trades: live.map(|t| t.pending).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(outcome: TradeOutcome, profit: f64, fees: Option<f64>) -> TradeRecord {
        TradeRecord {
            outcome,
            actual_profit_usd: profit,
            total_fees_usd: fees,
            ..Default::default()
        }
    }

    #[test]
    fn merge_prefers_recomputed_then_cached_then_default() {
        let r = merge(&[MetricSource::Cached(5.0), MetricSource::Recomputed(7.0)]);
        assert_eq!(r.value, 7.0);
        assert_eq!(r.provenance, Provenance::Recomputed);
        assert_eq!(r.cached, Some(5.0));

        let c = merge(&[MetricSource::Cached(5.0), MetricSource::Unavailable]);
        assert_eq!(c.value, 5.0);
        assert_eq!(c.provenance, Provenance::Cached);

        let d: Reconciled<f64> = merge(&[MetricSource::Unavailable, MetricSource::Unavailable]);
        assert_eq!(d.value, 0.0);
        assert_eq!(d.provenance, Provenance::Default);
    }

    #[test]
    fn inflated_cached_fees_are_rejected() {
        let policy = ReconcilerPolicy::default();
        let (fees, overridden) = merge_fees(
            &[MetricSource::Cached(500.0), MetricSource::Recomputed(30.0)],
            2,
            &policy,
        );
        assert_eq!(fees.value, 30.0);
        assert!(overridden);
        assert_eq!(fees.cached, Some(500.0));
    }

    #[test]
    fn fee_floor_applies_to_small_ledgers() {
        assert_eq!(ReconcilerPolicy::default().max_reasonable_fees(1), 100.0);
        assert_eq!(ReconcilerPolicy::default().max_reasonable_fees(10), 500.0);
    }

    #[test]
    fn zero_recomputed_fees_fall_back_to_cached() {
        let policy = ReconcilerPolicy::default();
        let (fees, overridden) = merge_fees(
            &[MetricSource::Cached(40.0), MetricSource::Recomputed(0.0)],
            2,
            &policy,
        );
        assert_eq!(fees.value, 40.0);
        assert_eq!(fees.provenance, Provenance::Cached);
        assert!(!overridden);

        let (fees, _) = merge_fees(
            &[MetricSource::Cached(0.0), MetricSource::Recomputed(12.0)],
            2,
            &policy,
        );
        assert_eq!(fees.value, 12.0);
    }

    #[test]
    fn end_to_end_three_trades() {
        let trades = vec![
            trade(TradeOutcome::Won, 10.0, None),
            trade(TradeOutcome::Lost, -4.0, None),
            trade(TradeOutcome::Pending, 0.0, None),
        ];
        let m = reconcile(&trades, None, &ReconcilerPolicy::default());
        assert_eq!(m.net_pnl.value, 6.0);
        assert_eq!(m.decided_trades(), 2);
        assert_eq!(m.counts.value.winning, 1);
        assert_eq!(m.counts.value.losing, 1);
        assert_eq!(m.counts.value.total, 3);
        assert_eq!(m.failed_executions, 0);
        assert_eq!(m.pending_trades, 1);
        assert_eq!(m.total_losses.value, 4.0);
        assert_eq!(m.best_trade.value, 10.0);
        assert_eq!(m.worst_trade.value, -4.0);
    }

    #[test]
    fn net_pnl_matches_decided_profit_sum() {
        let trades = vec![
            trade(TradeOutcome::Won, 3.25, Some(0.5)),
            trade(TradeOutcome::FailedExecution, 99.0, None),
            trade(TradeOutcome::Lost, -1.75, Some(0.25)),
            trade(TradeOutcome::Won, 0.5, None),
        ];
        let stale = AggregateSnapshot {
            total_pnl: Some(1000.0),
            total_trades: Some(1),
            winning_trades: Some(1),
            losing_trades: Some(0),
            ..Default::default()
        };
        let m = reconcile(&trades, Some(&stale), &ReconcilerPolicy::default());
        let expected: f64 = trades
            .iter()
            .filter(|t| t.is_decided())
            .map(|t| t.actual_profit_usd)
            .sum();
        assert!((m.net_pnl.value - expected).abs() < 1e-9);
        assert_eq!(m.net_pnl.cached, Some(1000.0));
        assert_eq!(m.counts.value.decided(), 3);
        assert_eq!(m.failed_executions, 1);
        assert!((m.total_fees.value - 0.75).abs() < 1e-9);
    }

    #[test]
    fn empty_ledger_uses_snapshot() {
        let snap = AggregateSnapshot {
            total_pnl: Some(42.0),
            winning_trades: Some(4),
            losing_trades: Some(2),
            total_fees_paid: Some(3.0),
            ..Default::default()
        };
        let m = reconcile(&[], Some(&snap), &ReconcilerPolicy::default());
        assert_eq!(m.net_pnl.value, 42.0);
        assert_eq!(m.net_pnl.provenance, Provenance::Cached);
        assert_eq!(m.counts.value.total, 6);
        assert_eq!(m.total_fees.value, 3.0);
        assert_eq!(m.total_losses.provenance, Provenance::Default);
    }

    #[test]
    fn nothing_available_degrades_to_zero() {
        let m = reconcile(&[], None, &ReconcilerPolicy::default());
        assert_eq!(m.net_pnl.value, 0.0);
        assert_eq!(m.counts.value, TradeCounts::default());
        assert_eq!(m.total_fees.value, 0.0);
        assert_eq!(m.total_fees.provenance, Provenance::Default);
    }

    #[test]
    fn fee_override_through_reconcile() {
        let trades = vec![
            trade(TradeOutcome::Won, 5.0, Some(20.0)),
            trade(TradeOutcome::Lost, -2.0, Some(10.0)),
        ];
        let snap = AggregateSnapshot {
            total_fees_paid: Some(500.0),
            ..Default::default()
        };
        let m = reconcile(&trades, Some(&snap), &ReconcilerPolicy::default());
        assert_eq!(m.total_fees.value, 30.0);
        assert!(m.fee_override);
    }
}
