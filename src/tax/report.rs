//! Tax aggregation
//!
//! Every executed trade in the filtered window becomes a [`TaxLot`] with
//! its fee resolved. Lots are summed in `Decimal` so that
//! `gains − losses − fees = net_pnl` holds to the cent.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use super::brackets::BracketTable;
use super::fees::FeePolicy;
use super::period::{PlatformFilter, ResolvedTaxQuery, TaxPeriod};
use crate::types::{Platform, TradeOutcome, TradeRecord};

/// f64 USD to Decimal; non-finite values become 0
pub fn usd(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// One executed trade as the tax view sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLot {
    pub trade_id: String,
    pub date: Option<DateTime<Utc>>,
    pub platform: Platform,
    pub market: String,
    pub position: Decimal,
    pub profit: Decimal,
    pub fees: Decimal,
    pub fees_estimated: bool,
    pub strategy: String,
    pub outcome: TradeOutcome,
}

impl TaxLot {
    pub fn from_trade(trade: &TradeRecord, fees: &FeePolicy) -> Self {
        let assessed = fees.assess(trade);
        Self {
            trade_id: trade.id.clone(),
            date: trade.created_at,
            platform: trade.platform(),
            market: trade.market.clone(),
            position: usd(trade.position_size_usd),
            profit: usd(trade.actual_profit_usd),
            fees: assessed.amount,
            fees_estimated: assessed.estimated,
            strategy: trade.strategy_type.clone(),
            outcome: trade.outcome,
        }
    }

    pub fn net(&self) -> Decimal {
        self.profit - self.fees
    }
}

/// Lots for every executed trade; failed executions never reach the tax view
pub fn build_lots<'a, I>(trades: I, fees: &FeePolicy) -> Vec<TaxLot>
where
    I: IntoIterator<Item = &'a TradeRecord>,
{
    trades
        .into_iter()
        .filter(|t| t.is_executed())
        .map(|t| TaxLot::from_trade(t, fees))
        .collect()
}

/// Running gains / losses / fees for a group of lots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotTotals {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub gains: Decimal,
    pub losses_amount: Decimal,
    pub fees: Decimal,
    pub estimated_fee_trades: u64,
}

impl LotTotals {
    pub fn add(&mut self, lot: &TaxLot) {
        self.trades += 1;
        match lot.outcome {
            TradeOutcome::Won => self.wins += 1,
            TradeOutcome::Lost => self.losses += 1,
            _ => {}
        }
        if lot.profit > Decimal::ZERO {
            self.gains += lot.profit;
        } else if lot.profit < Decimal::ZERO {
            self.losses_amount += -lot.profit;
        }
        self.fees += lot.fees;
        if lot.fees_estimated {
            self.estimated_fee_trades += 1;
        }
    }

    pub fn net_pnl(&self) -> Decimal {
        self.gains - self.losses_amount - self.fees
    }

    /// `wins / (wins + losses) × 100`, 0 when nothing is decided
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided > 0 {
            self.wins as f64 / decided as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl<'a> FromIterator<&'a TaxLot> for LotTotals {
    fn from_iter<I: IntoIterator<Item = &'a TaxLot>>(iter: I) -> Self {
        let mut totals = LotTotals::default();
        for lot in iter {
            totals.add(lot);
        }
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyBreakdown {
    pub strategy: String,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub gains: Decimal,
    pub losses_amount: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
    pub win_rate: f64,
}

/// Per-strategy totals, most active strategy first
pub fn strategy_breakdown(lots: &[TaxLot]) -> Vec<StrategyBreakdown> {
    let mut groups: HashMap<&str, LotTotals> = HashMap::new();
    for lot in lots {
        groups.entry(lot.strategy.as_str()).or_default().add(lot);
    }

    let mut rows: Vec<StrategyBreakdown> = groups
        .into_iter()
        .map(|(strategy, totals)| StrategyBreakdown {
            strategy: strategy.to_string(),
            trades: totals.trades,
            wins: totals.wins,
            losses: totals.losses,
            gains: totals.gains,
            losses_amount: totals.losses_amount,
            fees: totals.fees,
            net_pnl: totals.net_pnl(),
            win_rate: totals.win_rate(),
        })
        .collect();
    rows.sort_by(|a, b| b.trades.cmp(&a.trades).then_with(|| a.strategy.cmp(&b.strategy)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformBreakdown {
    pub platform: Platform,
    pub trades: u64,
    pub gains: Decimal,
    pub losses_amount: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBreakdown {
    /// `YYYY-MM`
    pub month: String,
    pub trades: u64,
    pub net_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub trades: u64,
    pub gains: Decimal,
    pub losses: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
    /// Everything resolves within days, so it is all short-term
    pub short_term_net: Decimal,
    pub long_term_net: Decimal,
    pub taxable_income: Decimal,
    pub tax_due: Decimal,
    /// Percent of taxable income
    pub effective_rate: f64,
    /// Percent
    pub marginal_rate: f64,
    pub estimated_fee_trades: u64,
}

impl TaxSummary {
    pub fn from_totals(totals: &LotTotals, brackets: &BracketTable) -> Self {
        let net_pnl = totals.net_pnl();
        let taxable_income = net_pnl.max(Decimal::ZERO);
        let tax_due = brackets.tax_due(taxable_income);
        let effective_rate = if taxable_income > Decimal::ZERO {
            (tax_due / taxable_income * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let marginal_rate = (brackets.marginal_rate(taxable_income) * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0);

        Self {
            trades: totals.trades,
            gains: totals.gains,
            losses: totals.losses_amount,
            fees: totals.fees,
            net_pnl,
            short_term_net: net_pnl,
            long_term_net: Decimal::ZERO,
            taxable_income,
            tax_due,
            effective_rate,
            marginal_rate,
            estimated_fee_trades: totals.estimated_fee_trades,
        }
    }
}

/// Tax view over one resolved period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxReport {
    pub period: TaxPeriod,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub platform: PlatformFilter,
    pub summary: TaxSummary,
    pub by_strategy: Vec<StrategyBreakdown>,
    pub by_platform: Vec<PlatformBreakdown>,
    pub by_month: Vec<MonthlyBreakdown>,
    /// Trades outside the period, on another platform, or undated
    pub excluded_trades: u64,
    pub lots: Vec<TaxLot>,
}

/// Brackets and fee policy the tax view runs with
#[derive(Debug, Clone, Default)]
pub struct TaxEngine {
    pub brackets: BracketTable,
    pub fees: FeePolicy,
}

impl TaxEngine {
    pub fn new(brackets: BracketTable, fees: FeePolicy) -> Self {
        Self { brackets, fees }
    }

    /// Lots inside the query's range and platform. Undated trades cannot be
    /// placed in a period and are left out.
    pub fn lots_for(&self, trades: &[TradeRecord], query: &ResolvedTaxQuery) -> Vec<TaxLot> {
        build_lots(
            trades.iter().filter(|t| {
                t.created_at.map_or(false, |at| query.range.contains(at))
                    && query.platform.matches(t.platform())
            }),
            &self.fees,
        )
    }

    pub fn report(&self, trades: &[TradeRecord], query: &ResolvedTaxQuery) -> TaxReport {
        let lots = self.lots_for(trades, query);
        let totals: LotTotals = lots.iter().collect();
        let summary = TaxSummary::from_totals(&totals, &self.brackets);
        let executed = trades.iter().filter(|t| t.is_executed()).count() as u64;

        info!(
            period = %query.period,
            platform = %query.platform,
            trades = summary.trades,
            net_pnl = %summary.net_pnl,
            tax_due = %summary.tax_due,
            "tax report computed"
        );

        TaxReport {
            period: query.period,
            start: query.range.start,
            end: query.range.end,
            platform: query.platform,
            by_strategy: strategy_breakdown(&lots),
            by_platform: platform_breakdown(&lots),
            by_month: monthly_breakdown(&lots),
            excluded_trades: executed.saturating_sub(summary.trades),
            summary,
            lots,
        }
    }
}

pub fn platform_breakdown(lots: &[TaxLot]) -> Vec<PlatformBreakdown> {
    let mut groups: BTreeMap<Platform, LotTotals> = BTreeMap::new();
    for lot in lots {
        groups.entry(lot.platform).or_default().add(lot);
    }
    groups
        .into_iter()
        .map(|(platform, totals)| PlatformBreakdown {
            platform,
            trades: totals.trades,
            gains: totals.gains,
            losses_amount: totals.losses_amount,
            fees: totals.fees,
            net_pnl: totals.net_pnl(),
        })
        .collect()
}

/// Chronological; undated lots are skipped
pub fn monthly_breakdown(lots: &[TaxLot]) -> Vec<MonthlyBreakdown> {
    let mut groups: BTreeMap<String, LotTotals> = BTreeMap::new();
    for lot in lots {
        if let Some(date) = lot.date {
            groups
                .entry(date.format("%Y-%m").to_string())
                .or_default()
                .add(lot);
        }
    }
    groups
        .into_iter()
        .map(|(month, totals)| MonthlyBreakdown {
            month,
            trades: totals.trades,
            net_pnl: totals.net_pnl(),
        })
        .collect()
}
