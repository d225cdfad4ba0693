//! Configuration sections and their conversions into engine policies

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::warn;

use crate::ledger::FetchPolicy;
use crate::metrics::{ReconcilerPolicy, StartingBalances};
use crate::tax::{BracketTable, FeePolicy, TaxBracket};
use crate::types::Platform;

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding trades/, opportunities/ and snapshot.json
    pub data_dir: String,
    /// Per-attempt fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Retries after the first attempt
    pub fetch_retries: u32,
    /// Linear backoff step in milliseconds
    pub retry_backoff_ms: u64,
}

impl LedgerConfig {
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_millis(self.fetch_timeout_ms),
            retries: self.fetch_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalancesConfig {
    /// Starting capital per platform (USD)
    #[serde(default)]
    pub starting: HashMap<String, f64>,
    /// Platforms counted toward the starting balance
    #[serde(default)]
    pub active_platforms: Vec<String>,
}

impl BalancesConfig {
    pub fn starting_balances(&self) -> StartingBalances {
        let mut amounts = BTreeMap::new();
        for (key, amount) in &self.starting {
            match Platform::from_str(key) {
                Some(platform) => {
                    amounts.insert(platform, *amount);
                }
                None => warn!(platform = %key, "ignoring starting balance for unknown platform"),
            }
        }
        let active = self
            .active_platforms
            .iter()
            .filter_map(|key| Platform::from_str(key))
            .collect();
        StartingBalances::new(amounts, active)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    pub fee_cap_per_trade: f64,
    pub fee_cap_floor: f64,
    pub divergence_tolerance: f64,
}

impl ReconcilerConfig {
    pub fn policy(&self) -> ReconcilerPolicy {
        ReconcilerPolicy {
            fee_cap_per_trade: self.fee_cap_per_trade,
            fee_cap_floor: self.fee_cap_floor,
            divergence_tolerance: self.divergence_tolerance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BracketConfig {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
    pub rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxConfig {
    /// Empty means the built-in 2025 US single-filer table
    #[serde(default)]
    pub brackets: Vec<BracketConfig>,
    /// Fee rate on positive profit, per platform
    #[serde(default)]
    pub fee_rates: HashMap<String, f64>,
    /// Days between acquisition and disposal on Form 8949
    pub resolution_offset_days: i64,
    pub export_dir: String,
}

fn decimal(value: f64, what: &str) -> Result<Decimal> {
    Decimal::from_f64(value).with_context(|| format!("{} {} is not a finite number", what, value))
}

impl TaxConfig {
    pub fn bracket_table(&self) -> Result<BracketTable> {
        if self.brackets.is_empty() {
            return Ok(BracketTable::default());
        }
        let brackets = self
            .brackets
            .iter()
            .map(|b| {
                Ok(TaxBracket::new(
                    decimal(b.min, "bracket min")?,
                    b.max.map(|m| decimal(m, "bracket max")).transpose()?,
                    decimal(b.rate, "bracket rate")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        BracketTable::new(brackets).context("Invalid tax.brackets")
    }

    pub fn fee_policy(&self) -> Result<FeePolicy> {
        if self.fee_rates.is_empty() {
            return Ok(FeePolicy::default());
        }
        let mut rates = BTreeMap::new();
        for (key, rate) in &self.fee_rates {
            let platform = Platform::from_str(key).unwrap_or(Platform::Unknown);
            rates.insert(platform, decimal(*rate, "fee rate")?);
        }
        FeePolicy::new(rates).context("Invalid tax.fee_rates")
    }

    pub fn resolution_offset(&self) -> chrono::Duration {
        chrono::Duration::days(self.resolution_offset_days.max(0))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// `EnvFilter` directive used when RUST_LOG is unset
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub bind_addr: String,
}
