//! Core types used throughout PolyLedger
//!
//! Normalized trade, snapshot and opportunity records shared by the
//! metrics and tax views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading venues the bot executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Polymarket,
    Kalshi,
    Unknown,
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Unknown
    }
}

impl Platform {
    /// Known venues, in display order
    pub const KNOWN: [Platform; 2] = [Platform::Polymarket, Platform::Kalshi];

    /// Config / query key (lowercase)
    pub fn key(&self) -> &'static str {
        match self {
            Platform::Polymarket => "polymarket",
            Platform::Kalshi => "kalshi",
            Platform::Unknown => "unknown",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "polymarket" | "poly" | "pm" => Some(Platform::Polymarket),
            "kalshi" | "ks" => Some(Platform::Kalshi),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Polymarket => write!(f, "Polymarket"),
            Platform::Kalshi => write!(f, "Kalshi"),
            Platform::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Binary contract side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
    Unknown,
}

impl Default for Side {
    fn default() -> Self {
        Side::Unknown
    }
}

impl Side {
    /// Parse from string ("yes"/"no", "up"/"down", "buy_yes" ...)
    pub fn from_str(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "yes" | "up" | "buy_yes" | "long" => Some(Side::Yes),
            "no" | "down" | "buy_no" | "short" => Some(Side::No),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
            Side::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Trade lifecycle state. Terminal once not `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    Pending,
    Won,
    Lost,
    FailedExecution,
}

impl Default for TradeOutcome {
    fn default() -> Self {
        TradeOutcome::Pending
    }
}

impl TradeOutcome {
    /// Won or lost
    pub fn is_decided(&self) -> bool {
        matches!(self, TradeOutcome::Won | TradeOutcome::Lost)
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "open" | "submitted" | "filled" => Some(TradeOutcome::Pending),
            "won" | "win" | "success" | "profit" => Some(TradeOutcome::Won),
            "lost" | "loss" | "lose" => Some(TradeOutcome::Lost),
            "failed_execution" | "failed" | "failure" | "error" | "cancelled" | "rejected" => {
                Some(TradeOutcome::FailedExecution)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Pending => write!(f, "pending"),
            TradeOutcome::Won => write!(f, "won"),
            TradeOutcome::Lost => write!(f, "lost"),
            TradeOutcome::FailedExecution => write!(f, "failed_execution"),
        }
    }
}

/// Venue-specific identifiers, keyed by platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum Venue {
    Polymarket {
        token_id: Option<String>,
        condition_id: Option<String>,
    },
    Kalshi {
        ticker: Option<String>,
    },
    Unknown,
}

impl Default for Venue {
    fn default() -> Self {
        Venue::Unknown
    }
}

impl Venue {
    pub fn platform(&self) -> Platform {
        match self {
            Venue::Polymarket { .. } => Platform::Polymarket,
            Venue::Kalshi { .. } => Platform::Kalshi,
            Venue::Unknown => Platform::Unknown,
        }
    }
}

/// One resolved or pending trade attempt, normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    /// Trade open time; `None` when the ledger timestamp was unparseable
    pub created_at: Option<DateTime<Utc>>,
    pub venue: Venue,
    pub market: String,
    pub side: Side,
    pub position_size_usd: f64,
    /// Gross expected profit before fees/slippage
    pub expected_profit_usd: f64,
    /// Realized net profit after fees/slippage; 0 while pending
    pub actual_profit_usd: f64,
    /// Recorded fees; `None` means the ledger has no figure
    pub total_fees_usd: Option<f64>,
    pub outcome: TradeOutcome,
    pub strategy_type: String,
}

impl Default for TradeRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            created_at: None,
            venue: Venue::Unknown,
            market: "Unknown".to_string(),
            side: Side::Unknown,
            position_size_usd: 0.0,
            expected_profit_usd: 0.0,
            actual_profit_usd: 0.0,
            total_fees_usd: None,
            outcome: TradeOutcome::Pending,
            strategy_type: "unknown".to_string(),
        }
    }
}

impl TradeRecord {
    pub fn platform(&self) -> Platform {
        self.venue.platform()
    }

    pub fn is_decided(&self) -> bool {
        self.outcome.is_decided()
    }

    /// Counts toward executed trades (anything that was not a failed execution)
    pub fn is_executed(&self) -> bool {
        self.outcome != TradeOutcome::FailedExecution
    }

    /// Recorded fee, or 0 when absent
    pub fn recorded_fees(&self) -> f64 {
        self.total_fees_usd.unwrap_or(0.0)
    }
}

/// Cached aggregate rollup produced by an external process.
/// Possibly stale; fee totals are known to get inflated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    #[serde(default)]
    pub total_pnl: Option<f64>,
    #[serde(default)]
    pub total_trades: Option<u64>,
    #[serde(default)]
    pub winning_trades: Option<u64>,
    #[serde(default)]
    pub losing_trades: Option<u64>,
    #[serde(default)]
    pub total_fees_paid: Option<f64>,
    #[serde(default)]
    pub best_trade_profit: Option<f64>,
    #[serde(default)]
    pub worst_trade_loss: Option<f64>,
    #[serde(default)]
    pub total_opportunities_seen: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AggregateSnapshot {
    /// Win rate implied by the cached counts, 0 when there are none
    pub fn cached_win_rate(&self) -> f64 {
        let wins = self.winning_trades.unwrap_or(0);
        let losses = self.losing_trades.unwrap_or(0);
        let decided = wins + losses;
        if decided > 0 {
            wins as f64 / decided as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// A detected signal prior to the trade decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub profit_percent: f64,
    #[serde(default)]
    pub buy_price: f64,
    #[serde(default)]
    pub sell_price: f64,
    #[serde(default)]
    pub buy_market_name: String,
}

/// Opportunity sample plus the authoritative count reported by the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityWindow {
    pub records: Vec<OpportunityRecord>,
    /// Exact count from the store; the sample may be truncated
    pub total_count: Option<u64>,
}
