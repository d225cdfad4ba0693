//! Trade Classifier
//!
//! Normalizes raw ledger rows into [`TradeRecord`]s: platform and side are
//! inferred, outcome is derived from `outcome`/`status`, numbers are
//! coerced with `parseFloat(x) || 0` semantics. Never fails.

use tracing::debug;

use super::raw::{
    coerce_f64, coerce_opt_f64, parse_timestamp, text, ClassifierDiagnostics, RawOpportunityRow,
    RawTradeRow,
};
use crate::types::{
    OpportunityRecord, OpportunityWindow, Platform, Side, TradeOutcome, TradeRecord, Venue,
};

/// Statuses meaning the market has settled even without an explicit outcome
const SETTLED_STATUSES: [&str; 4] = ["resolved", "settled", "closed", "complete"];

/// Classify a single raw trade row
pub fn classify_trade(raw: &RawTradeRow, diag: &mut ClassifierDiagnostics) -> TradeRecord {
    diag.rows += 1;

    let kalshi_ticker = text(raw.kalshi_ticker.as_ref());
    let token_id = text(raw.polymarket_token_id.as_ref());
    let condition_id = text(raw.polymarket_condition_id.as_ref());

    let explicit = text(raw.platform.as_ref()).and_then(|p| Platform::from_str(&p));
    let platform = match explicit {
        Some(p) => p,
        None => {
            let inferred = infer_platform(
                kalshi_ticker.is_some(),
                token_id.is_some() || condition_id.is_some(),
            );
            if inferred != Platform::Unknown {
                diag.inferred_platforms += 1;
            }
            inferred
        }
    };

    let venue = match platform {
        Platform::Polymarket => Venue::Polymarket {
            token_id,
            condition_id,
        },
        Platform::Kalshi => Venue::Kalshi {
            ticker: kalshi_ticker,
        },
        Platform::Unknown => Venue::Unknown,
    };

    let market = text(raw.market_title.as_ref())
        .or_else(|| match platform {
            Platform::Kalshi => text(raw.kalshi_market_title.as_ref()),
            _ => text(raw.polymarket_market_title.as_ref()),
        })
        .or_else(|| text(raw.polymarket_market_title.as_ref()))
        .or_else(|| text(raw.kalshi_market_title.as_ref()))
        .or_else(|| match &venue {
            Venue::Kalshi { ticker: Some(t) } => Some(t.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let created_at = parse_timestamp(raw.created_at.as_ref());
    if created_at.is_none() {
        diag.unparseable_dates += 1;
    }

    let position_size_usd = coerce_f64(raw.position_size_usd.as_ref(), diag).max(0.0);
    let expected_profit_usd = coerce_f64(raw.expected_profit_usd.as_ref(), diag);
    let profit = coerce_f64(raw.actual_profit_usd.as_ref(), diag);
    let total_fees_usd = coerce_opt_f64(raw.total_fees_usd.as_ref(), diag).map(|f| f.max(0.0));

    let outcome = derive_outcome(
        text(raw.outcome.as_ref()).as_deref(),
        text(raw.status.as_ref()).as_deref(),
        profit,
    );
    let actual_profit_usd = if outcome == TradeOutcome::Pending {
        0.0
    } else {
        profit
    };

    let side = text(raw.side.as_ref())
        .and_then(|s| Side::from_str(&s))
        .unwrap_or_default();

    let strategy_type = text(raw.strategy_type.as_ref())
        .or_else(|| text(raw.trade_type.as_ref()))
        .unwrap_or_else(|| "unknown".to_string());

    TradeRecord {
        id: text(raw.id.as_ref()).unwrap_or_default(),
        created_at,
        venue,
        market,
        side,
        position_size_usd,
        expected_profit_usd,
        actual_profit_usd,
        total_fees_usd,
        outcome,
        strategy_type,
    }
}

/// Venue by which identifier is populated. A Kalshi ticker wins when both are set.
pub fn infer_platform(has_kalshi_ticker: bool, has_polymarket_id: bool) -> Platform {
    if has_kalshi_ticker {
        Platform::Kalshi
    } else if has_polymarket_id {
        Platform::Polymarket
    } else {
        Platform::Unknown
    }
}

/// Completion state from the `outcome` column, falling back to `status`.
/// A settled status without an outcome is classified by the sign of the
/// realized profit (break-even counts as a win).
pub fn derive_outcome(outcome: Option<&str>, status: Option<&str>, profit: f64) -> TradeOutcome {
    if let Some(parsed) = outcome.and_then(TradeOutcome::from_str) {
        return parsed;
    }
    let Some(status) = status else {
        return TradeOutcome::Pending;
    };
    if let Some(parsed) = TradeOutcome::from_str(status) {
        return parsed;
    }
    let lower = status.trim().to_lowercase();
    if SETTLED_STATUSES.contains(&lower.as_str()) {
        if profit >= 0.0 {
            TradeOutcome::Won
        } else {
            TradeOutcome::Lost
        }
    } else {
        TradeOutcome::Pending
    }
}

/// Classify a whole ledger batch, oldest trade first (undated rows lead).
pub fn classify_ledger(rows: &[RawTradeRow]) -> (Vec<TradeRecord>, ClassifierDiagnostics) {
    let mut diag = ClassifierDiagnostics::default();
    let mut trades: Vec<TradeRecord> = rows.iter().map(|r| classify_trade(r, &mut diag)).collect();
    trades.sort_by_key(|t| t.created_at);

    if diag.coerced_fields() > 0 || diag.unparseable_dates > 0 {
        debug!(
            rows = diag.rows,
            missing = diag.missing_fields,
            malformed = diag.malformed_fields,
            bad_dates = diag.unparseable_dates,
            "Ledger cells coerced during classification"
        );
    }
    (trades, diag)
}

/// Classify a raw opportunity row
pub fn classify_opportunity(
    raw: &RawOpportunityRow,
    diag: &mut ClassifierDiagnostics,
) -> OpportunityRecord {
    diag.rows += 1;
    let detected_at = parse_timestamp(raw.detected_at.as_ref());
    if detected_at.is_none() {
        diag.unparseable_dates += 1;
    }
    OpportunityRecord {
        id: text(raw.id.as_ref()).unwrap_or_default(),
        detected_at,
        strategy: text(raw.strategy.as_ref()).unwrap_or_else(|| "unknown".to_string()),
        profit_percent: coerce_f64(raw.profit_percent.as_ref(), diag),
        buy_price: coerce_f64(raw.buy_price.as_ref(), diag),
        sell_price: coerce_f64(raw.sell_price.as_ref(), diag),
        buy_market_name: text(raw.buy_market_name.as_ref()).unwrap_or_default(),
    }
}

/// Classify an opportunity sample; `total_count` is the store's exact count.
pub fn classify_opportunities(
    rows: &[RawOpportunityRow],
    total_count: Option<u64>,
) -> (OpportunityWindow, ClassifierDiagnostics) {
    let mut diag = ClassifierDiagnostics::default();
    let records = rows
        .iter()
        .map(|r| classify_opportunity(r, &mut diag))
        .collect();
    (
        OpportunityWindow {
            records,
            total_count,
        },
        diag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> RawTradeRow {
        serde_json::from_value(value).expect("raw row")
    }

    #[test]
    fn infers_kalshi_from_ticker() {
        let mut diag = ClassifierDiagnostics::default();
        let trade = classify_trade(
            &row(json!({
                "id": "t1",
                "kalshi_ticker": "KXBTC-25MAR01",
                "outcome": "won",
                "actual_profit_usd": "3.5",
            })),
            &mut diag,
        );
        assert_eq!(trade.platform(), Platform::Kalshi);
        assert_eq!(
            trade.venue,
            Venue::Kalshi {
                ticker: Some("KXBTC-25MAR01".to_string())
            }
        );
        assert_eq!(trade.market, "KXBTC-25MAR01");
        assert_eq!(trade.actual_profit_usd, 3.5);
        assert_eq!(diag.inferred_platforms, 1);
    }

    #[test]
    fn infers_polymarket_from_token_id() {
        let mut diag = ClassifierDiagnostics::default();
        let trade = classify_trade(
            &row(json!({
                "polymarket_token_id": "0xabc",
                "polymarket_market_title": "Will BTC close above 100k?",
            })),
            &mut diag,
        );
        assert_eq!(trade.platform(), Platform::Polymarket);
        assert_eq!(trade.market, "Will BTC close above 100k?");
    }

    #[test]
    fn explicit_platform_beats_inference() {
        let mut diag = ClassifierDiagnostics::default();
        let trade = classify_trade(
            &row(json!({ "platform": "polymarket", "kalshi_ticker": "KX" })),
            &mut diag,
        );
        assert_eq!(trade.platform(), Platform::Polymarket);
        assert_eq!(diag.inferred_platforms, 0);
    }

    #[test]
    fn malformed_numbers_degrade_to_zero() {
        let mut diag = ClassifierDiagnostics::default();
        let trade = classify_trade(
            &row(json!({
                "outcome": "lost",
                "position_size_usd": "n/a",
                "actual_profit_usd": "-4",
                "total_fees_usd": "garbage",
            })),
            &mut diag,
        );
        assert_eq!(trade.position_size_usd, 0.0);
        assert_eq!(trade.actual_profit_usd, -4.0);
        assert_eq!(trade.total_fees_usd, Some(0.0));
        assert_eq!(diag.malformed_fields, 2);
        // expected_profit_usd absent
        assert_eq!(diag.missing_fields, 1);
        assert_eq!(trade.market, "Unknown");
        assert_eq!(trade.strategy_type, "unknown");
    }

    #[test]
    fn pending_trades_carry_no_profit() {
        let mut diag = ClassifierDiagnostics::default();
        let trade = classify_trade(
            &row(json!({ "status": "open", "actual_profit_usd": 12.0 })),
            &mut diag,
        );
        assert_eq!(trade.outcome, TradeOutcome::Pending);
        assert_eq!(trade.actual_profit_usd, 0.0);
    }

    #[test]
    fn settled_status_classified_by_profit_sign() {
        assert_eq!(derive_outcome(None, Some("resolved"), 1.0), TradeOutcome::Won);
        assert_eq!(derive_outcome(None, Some("settled"), -1.0), TradeOutcome::Lost);
        assert_eq!(derive_outcome(None, Some("closed"), 0.0), TradeOutcome::Won);
        assert_eq!(
            derive_outcome(Some("weird"), Some("failed"), 5.0),
            TradeOutcome::FailedExecution
        );
        assert_eq!(derive_outcome(None, None, 5.0), TradeOutcome::Pending);
    }

    #[test]
    fn ledger_sorted_oldest_first() {
        let rows = vec![
            row(json!({ "id": "b", "created_at": "2025-02-01T00:00:00Z" })),
            row(json!({ "id": "a", "created_at": "2025-01-01T00:00:00Z" })),
        ];
        let (trades, diag) = classify_ledger(&rows);
        assert_eq!(trades[0].id, "a");
        assert_eq!(trades[1].id, "b");
        assert_eq!(diag.rows, 2);
    }

    #[test]
    fn opportunity_defaults() {
        let raw: RawOpportunityRow = serde_json::from_value(json!({
            "strategy": "cross_platform",
            "profit_percent": "2.5",
            "buy_market_name": "BTC up",
        }))
        .expect("raw opportunity");
        let (window, diag) = classify_opportunities(&[raw], Some(10));
        assert_eq!(window.records[0].profit_percent, 2.5);
        assert_eq!(window.records[0].buy_price, 0.0);
        assert_eq!(window.total_count, Some(10));
        assert_eq!(diag.missing_fields, 2);
    }
}
