//! Configuration management for PolyLedger
//!
//! Loads from config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::metrics::MetricsSettings;
use crate::tax::TaxEngine;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub balances: BalancesConfig,
    pub reconciler: ReconcilerConfig,
    pub tax: TaxConfig,
    pub logging: LoggingConfig,
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (POLYLEDGER__*)
            .add_source(Environment::with_prefix("POLYLEDGER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Built-in defaults, before any file or environment layer
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Ledger defaults
            .set_default("ledger.data_dir", "./data")?
            .set_default("ledger.fetch_timeout_ms", 10_000)?
            .set_default("ledger.fetch_retries", 2)?
            .set_default("ledger.retry_backoff_ms", 250)?
            // Balance defaults
            .set_default("balances.starting.polymarket", 100.0)?
            .set_default("balances.starting.kalshi", 100.0)?
            .set_default("balances.active_platforms", vec!["polymarket", "kalshi"])?
            // Reconciler defaults
            .set_default("reconciler.fee_cap_per_trade", 50.0)?
            .set_default("reconciler.fee_cap_floor", 100.0)?
            .set_default("reconciler.divergence_tolerance", 0.01)?
            // Tax defaults
            .set_default("tax.fee_rates.kalshi", 0.07)?
            .set_default("tax.fee_rates.polymarket", 0.0)?
            .set_default(
                "tax.resolution_offset_days",
                crate::tax::export::DEFAULT_RESOLUTION_OFFSET_DAYS,
            )?
            .set_default("tax.export_dir", "./data/exports")?
            // Logging defaults
            .set_default("logging.json", false)?
            .set_default("logging.filter", "polyledger=info")?
            // Dashboard defaults
            .set_default("dashboard.bind_addr", "127.0.0.1:3030")?;
        Ok(builder)
    }

    /// Metrics policies derived from config
    pub fn metrics_settings(&self) -> Result<MetricsSettings> {
        Ok(MetricsSettings {
            reconciler: self.reconciler.policy(),
            balances: self.balances.starting_balances(),
            fees: self.tax.fee_policy()?,
        })
    }

    pub fn tax_engine(&self) -> Result<TaxEngine> {
        Ok(TaxEngine::new(
            self.tax.bracket_table()?,
            self.tax.fee_policy()?,
        ))
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "data_dir={} active={:?} fee_cap={}/{} brackets={} offset_days={} export_dir={}",
            self.ledger.data_dir,
            self.balances.active_platforms,
            self.reconciler.fee_cap_per_trade,
            self.reconciler.fee_cap_floor,
            if self.tax.brackets.is_empty() {
                "default".to_string()
            } else {
                self.tax.brackets.len().to_string()
            },
            self.tax.resolution_offset_days,
            self.tax.export_dir
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn defaults() -> AppConfig {
        AppConfig::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_deserialize() {
        let config = defaults();
        assert_eq!(config.ledger.fetch_policy().timeout, Duration::from_secs(10));
        assert_eq!(config.balances.starting_balances().total(), 200.0);
        assert_eq!(config.reconciler.policy().max_reasonable_fees(1), 100.0);
        assert_eq!(config.tax.resolution_offset(), chrono::Duration::days(1));
        assert_eq!(config.logging.filter, "polyledger=info");
    }

    #[test]
    fn default_tax_policies() {
        let config = defaults();
        let engine = config.tax_engine().unwrap();
        assert_eq!(engine.brackets, crate::tax::BracketTable::us_2025_single());
        assert_eq!(engine.fees.rate(Platform::Kalshi), dec!(0.07));
        assert_eq!(engine.fees.rate(Platform::Polymarket), dec!(0));
    }

    #[test]
    fn overrides_replace_defaults() {
        let config: AppConfig = AppConfig::defaults()
            .unwrap()
            .set_override("balances.active_platforms", vec!["kalshi"])
            .unwrap()
            .set_override("tax.fee_rates.kalshi", 0.05)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.balances.starting_balances().total(), 100.0);
        assert_eq!(config.tax.fee_policy().unwrap().rate(Platform::Kalshi), dec!(0.05));
        assert!(config.digest().contains("data_dir=./data"));
    }

    #[test]
    fn invalid_brackets_are_rejected() {
        let tax = TaxConfig {
            brackets: vec![BracketConfig {
                min: 0.0,
                max: Some(1000.0),
                rate: 0.1,
            }],
            fee_rates: Default::default(),
            resolution_offset_days: 1,
            export_dir: "./exports".to_string(),
        };
        assert!(tax.bracket_table().is_err());
    }
}
