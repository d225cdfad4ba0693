//! Fee estimation for trades without a recorded fee
//!
//! Kalshi charges on winnings, Polymarket does not charge trading fees.
//! Rates are per platform and apply to positive profit only.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::report::usd;
use super::TaxError;
use crate::types::{Platform, TradeRecord};

pub const DEFAULT_KALSHI_FEE_RATE: Decimal = dec!(0.07);
pub const DEFAULT_POLYMARKET_FEE_RATE: Decimal = Decimal::ZERO;

/// Fee charged on a trade and whether it was estimated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeAssessment {
    pub amount: Decimal,
    pub estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeePolicy {
    rates: BTreeMap<Platform, Decimal>,
}

impl Default for FeePolicy {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(Platform::Kalshi, DEFAULT_KALSHI_FEE_RATE);
        rates.insert(Platform::Polymarket, DEFAULT_POLYMARKET_FEE_RATE);
        Self { rates }
    }
}

impl FeePolicy {
    /// Build from explicit rates; platforms left out are charged nothing
    pub fn new(rates: BTreeMap<Platform, Decimal>) -> Result<Self, TaxError> {
        for (platform, rate) in &rates {
            if *rate < Decimal::ZERO || *rate > Decimal::ONE {
                return Err(TaxError::InvalidFeeRate {
                    platform: *platform,
                    rate: *rate,
                });
            }
        }
        Ok(Self { rates })
    }

    pub fn rate(&self, platform: Platform) -> Decimal {
        self.rates.get(&platform).copied().unwrap_or(Decimal::ZERO)
    }

    /// `rate × max(profit, 0)`
    pub fn estimate(&self, platform: Platform, profit: Decimal) -> Decimal {
        self.rate(platform) * profit.max(Decimal::ZERO)
    }

    /// Recorded fee when present, otherwise the estimate
    pub fn assess(&self, trade: &TradeRecord) -> FeeAssessment {
        match trade.total_fees_usd {
            Some(amount) => FeeAssessment {
                amount: usd(amount),
                estimated: false,
            },
            None => FeeAssessment {
                amount: self.estimate(trade.platform(), usd(trade.actual_profit_usd)),
                estimated: true,
            },
        }
    }
}
