//! Opportunity funnel
//!
//! Filters scanner output down to genuine arbitrage signals and measures
//! how many of them turned into trades.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{OpportunityRecord, OpportunityWindow, TradeRecord};

/// Diagnostic activity rows logged by the scanner, not arbitrage
pub const ACTIVITY_SIGNAL_PREFIX: &str = "High activity: ";

/// Priced or profitable, and not an activity signal
pub fn is_real_signal(opportunity: &OpportunityRecord) -> bool {
    let priced = opportunity.buy_price > 0.0 && opportunity.sell_price > 0.0;
    (opportunity.profit_percent > 0.0 || priced)
        && !opportunity.buy_market_name.starts_with(ACTIVITY_SIGNAL_PREFIX)
}

/// `seen > 0 ? traded / seen × 100 : 0`
pub fn conversion_rate(traded: u64, seen: u64) -> f64 {
    if seen > 0 {
        traded as f64 / seen as f64 * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyFunnelRow {
    pub strategy: String,
    pub count: u64,
    pub avg_profit_percent: f64,
    pub best_profit_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelSummary {
    /// Authoritative count when the store reported one, else the real-signal sample size
    pub total_seen: u64,
    pub sample_size: u64,
    pub real_signals: u64,
    pub activity_signals_excluded: u64,
    pub total_traded: u64,
    pub conversion_rate: f64,
    /// Largest group first
    pub by_strategy: Vec<StrategyFunnelRow>,
}

/// Real signals from a window, in input order
pub fn real_signals(window: &OpportunityWindow) -> Vec<&OpportunityRecord> {
    window.records.iter().filter(|o| is_real_signal(o)).collect()
}

/// Group real signals by strategy
pub fn strategy_breakdown(signals: &[&OpportunityRecord]) -> Vec<StrategyFunnelRow> {
    let mut groups: HashMap<&str, (u64, f64, f64)> = HashMap::new();
    for signal in signals {
        let entry = groups
            .entry(signal.strategy.as_str())
            .or_insert((0, 0.0, f64::MIN));
        entry.0 += 1;
        entry.1 += signal.profit_percent;
        entry.2 = entry.2.max(signal.profit_percent);
    }

    let mut rows: Vec<StrategyFunnelRow> = groups
        .into_iter()
        .map(|(strategy, (count, sum, best))| StrategyFunnelRow {
            strategy: strategy.to_string(),
            count,
            avg_profit_percent: sum / count as f64,
            best_profit_percent: best,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.strategy.cmp(&b.strategy)));
    rows
}

/// Funnel summary. `trades` is the current trade window; failed executions
/// do not count as traded.
pub fn analyze(window: &OpportunityWindow, trades: &[TradeRecord]) -> FunnelSummary {
    let signals = real_signals(window);
    let activity = window
        .records
        .iter()
        .filter(|o| o.buy_market_name.starts_with(ACTIVITY_SIGNAL_PREFIX))
        .count() as u64;

    let real = signals.len() as u64;
    let total_seen = window.total_count.filter(|c| *c > 0).unwrap_or(real);
    let total_traded = trades.iter().filter(|t| t.is_executed()).count() as u64;

    FunnelSummary {
        total_seen,
        sample_size: window.records.len() as u64,
        real_signals: real,
        activity_signals_excluded: activity,
        total_traded,
        conversion_rate: conversion_rate(total_traded, total_seen),
        by_strategy: strategy_breakdown(&signals),
    }
}
