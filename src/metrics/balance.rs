//! Balance / P&L calculator
//!
//! Derives balance, ROI, gross profit and win/loss distributions from
//! reconciled inputs. Every ratio is guarded: a zero denominator yields the
//! documented default, never NaN or infinity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::reconciler::ReconciledMetrics;
use crate::types::{Platform, TradeOutcome, TradeRecord};

/// P&L histogram edges (USD). Buckets are `[edge[i-1], edge[i])`, open-ended at both ends.
pub const PNL_BUCKET_EDGES: [f64; 7] = [-50.0, -10.0, -1.0, 0.0, 1.0, 10.0, 50.0];

/// Starting capital per platform, injected from config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartingBalances {
    pub amounts: BTreeMap<Platform, f64>,
    pub active: Vec<Platform>,
}

impl StartingBalances {
    pub fn new(amounts: BTreeMap<Platform, f64>, active: Vec<Platform>) -> Self {
        Self { amounts, active }
    }

    /// Same amount on every listed platform, all active
    pub fn uniform(amount: f64, platforms: &[Platform]) -> Self {
        Self {
            amounts: platforms.iter().map(|p| (*p, amount)).collect(),
            active: platforms.to_vec(),
        }
    }

    /// Σ configured amount over active platforms
    pub fn total(&self) -> f64 {
        let mut seen = Vec::with_capacity(self.active.len());
        let mut total = 0.0;
        for platform in &self.active {
            if seen.contains(platform) {
                continue;
            }
            seen.push(*platform);
            total += self.amounts.get(platform).copied().unwrap_or(0.0).max(0.0);
        }
        total
    }
}

/// Headline figures for the balance card
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub starting_balance: f64,
    pub current_balance: f64,
    pub net_pnl: f64,
    pub roi_pct: f64,
    pub gross_profit: f64,
    pub total_fees: f64,
    pub total_losses: f64,
    pub avg_pnl_per_trade: f64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub decided_trades: u64,
    pub failed_executions: u64,
    pub win_rate: f64,
    pub execution_rate: f64,
}

/// `decided > 0 ? wins / decided × 100 : fallback`, clamped to [0, 100]
pub fn win_rate(winning: u64, decided: u64, fallback: f64) -> f64 {
    let rate = if decided > 0 {
        winning as f64 / decided as f64 * 100.0
    } else {
        fallback
    };
    if rate.is_finite() {
        rate.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// `decided / (decided + failed) × 100`, 100 when nothing was attempted
pub fn execution_rate(decided: u64, failed: u64) -> f64 {
    let attempted = decided + failed;
    if attempted > 0 {
        decided as f64 / attempted as f64 * 100.0
    } else {
        100.0
    }
}

/// Build the balance card from reconciled metrics.
/// `cached_win_rate` is only used when there are no decided trades.
pub fn summarize(
    metrics: &ReconciledMetrics,
    balances: &StartingBalances,
    cached_win_rate: f64,
) -> BalanceSummary {
    let starting_balance = balances.total();
    let net_pnl = metrics.net_pnl.value;
    let total_fees = metrics.total_fees.value;
    let total_losses = metrics.total_losses.value;
    let counts = metrics.counts.value;
    let decided = counts.decided();

    let roi_pct = if starting_balance > 0.0 {
        net_pnl / starting_balance * 100.0
    } else {
        0.0
    };
    let avg_pnl_per_trade = if counts.total > 0 {
        net_pnl / counts.total as f64
    } else {
        0.0
    };

    BalanceSummary {
        starting_balance,
        current_balance: starting_balance + net_pnl,
        net_pnl,
        roi_pct,
        gross_profit: net_pnl + total_losses + total_fees,
        total_fees,
        total_losses,
        avg_pnl_per_trade,
        total_trades: counts.total,
        winning_trades: counts.winning,
        losing_trades: counts.losing,
        decided_trades: decided,
        failed_executions: metrics.failed_executions,
        win_rate: win_rate(counts.winning, decided, cached_win_rate),
        execution_rate: execution_rate(decided, metrics.failed_executions),
    }
}

/// One P&L histogram bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlBucket {
    pub label: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub count: u64,
}

/// Win/loss shape of the decided trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WinLossDistribution {
    pub wins: u64,
    pub losses: u64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Gross wins / gross losses; 0 when there are no losses
    pub profit_factor: f64,
    /// Positive for a win streak, negative for a loss streak
    pub current_streak: i32,
    pub best_streak: i32,
    pub worst_streak: i32,
    /// Peak-to-trough equity drop, percent of peak
    pub max_drawdown_pct: f64,
    pub buckets: Vec<PnlBucket>,
}

fn bucket_label(lower: Option<f64>, upper: Option<f64>) -> String {
    match (lower, upper) {
        (None, Some(u)) => format!("< {}", u),
        (Some(l), None) => format!(">= {}", l),
        (Some(l), Some(u)) => format!("{} to {}", l, u),
        (None, None) => "all".to_string(),
    }
}

fn empty_buckets() -> Vec<PnlBucket> {
    let mut buckets = Vec::with_capacity(PNL_BUCKET_EDGES.len() + 1);
    let mut lower = None;
    for edge in PNL_BUCKET_EDGES {
        buckets.push(PnlBucket {
            label: bucket_label(lower, Some(edge)),
            lower,
            upper: Some(edge),
            count: 0,
        });
        lower = Some(edge);
    }
    buckets.push(PnlBucket {
        label: bucket_label(lower, None),
        lower,
        upper: None,
        count: 0,
    });
    buckets
}

fn bucket_index(pnl: f64) -> usize {
    PNL_BUCKET_EDGES
        .iter()
        .position(|edge| pnl < *edge)
        .unwrap_or(PNL_BUCKET_EDGES.len())
}

/// Distribution over decided trades, in ledger order (oldest first).
/// `starting_balance` anchors the equity curve for drawdown.
pub fn distribution(trades: &[TradeRecord], starting_balance: f64) -> WinLossDistribution {
    let mut dist = WinLossDistribution {
        buckets: empty_buckets(),
        ..Default::default()
    };

    let mut gross_wins = 0.0;
    let mut gross_losses = 0.0;
    let mut equity = starting_balance;
    let mut peak = starting_balance;

    for trade in trades.iter().filter(|t| t.is_decided()) {
        let pnl = trade.actual_profit_usd;
        if trade.outcome == TradeOutcome::Won {
            dist.wins += 1;
            gross_wins += pnl;
            dist.largest_win = dist.largest_win.max(pnl);
            dist.current_streak = if dist.current_streak > 0 {
                dist.current_streak + 1
            } else {
                1
            };
        } else {
            dist.losses += 1;
            gross_losses += pnl.abs();
            dist.largest_loss = dist.largest_loss.max(pnl.abs());
            dist.current_streak = if dist.current_streak < 0 {
                dist.current_streak - 1
            } else {
                -1
            };
        }
        dist.best_streak = dist.best_streak.max(dist.current_streak);
        dist.worst_streak = dist.worst_streak.min(dist.current_streak);

        equity += pnl;
        peak = peak.max(equity);
        if peak > 0.0 {
            dist.max_drawdown_pct = dist.max_drawdown_pct.max((peak - equity) / peak * 100.0);
        }

        dist.buckets[bucket_index(pnl)].count += 1;
    }

    dist.avg_win = if dist.wins > 0 {
        gross_wins / dist.wins as f64
    } else {
        0.0
    };
    dist.avg_loss = if dist.losses > 0 {
        gross_losses / dist.losses as f64
    } else {
        0.0
    };
    dist.profit_factor = if gross_losses > 0.0 {
        gross_wins / gross_losses
    } else {
        gross_wins
    };
    dist
}
