//! Progressive tax brackets
//!
//! Tax on a net gain is the sum, bracket by bracket, of
//! `rate × min(remaining, max − min)`. Tables are validated on
//! construction: they start at 0, have no gaps and end open.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::TaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min: Decimal,
    /// `None` for the top, open-ended bracket
    pub max: Option<Decimal>,
    pub rate: Decimal,
}

impl TaxBracket {
    pub fn new(min: Decimal, max: Option<Decimal>, rate: Decimal) -> Self {
        Self { min, max, rate }
    }

    fn width(&self) -> Option<Decimal> {
        self.max.map(|max| max - self.min)
    }
}

/// Ordered bracket table covering `[0, ∞)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketTable {
    brackets: Vec<TaxBracket>,
}

impl BracketTable {
    pub fn new(brackets: Vec<TaxBracket>) -> Result<Self, TaxError> {
        let Some(first) = brackets.first() else {
            return Err(TaxError::InvalidBrackets("table is empty".to_string()));
        };
        if !first.min.is_zero() {
            return Err(TaxError::InvalidBrackets(format!(
                "first bracket starts at {} instead of 0",
                first.min
            )));
        }

        let last = brackets.len() - 1;
        for (i, bracket) in brackets.iter().enumerate() {
            if bracket.rate < Decimal::ZERO || bracket.rate > Decimal::ONE {
                return Err(TaxError::InvalidBrackets(format!(
                    "bracket {} rate {} outside [0, 1]",
                    i, bracket.rate
                )));
            }
            match bracket.max {
                Some(max) if max <= bracket.min => {
                    return Err(TaxError::InvalidBrackets(format!(
                        "bracket {} is empty ({} to {})",
                        i, bracket.min, max
                    )));
                }
                Some(_) if i == last => {
                    return Err(TaxError::InvalidBrackets(
                        "top bracket must be open-ended".to_string(),
                    ));
                }
                None if i != last => {
                    return Err(TaxError::InvalidBrackets(format!(
                        "bracket {} is open-ended but not last",
                        i
                    )));
                }
                _ => {}
            }
            if i > 0 && brackets[i - 1].max != Some(bracket.min) {
                return Err(TaxError::InvalidBrackets(format!(
                    "gap or overlap before bracket {} (starts at {})",
                    i, bracket.min
                )));
            }
        }

        Ok(Self { brackets })
    }

    /// 2025 US federal brackets, single filer
    pub fn us_2025_single() -> Self {
        Self {
            brackets: vec![
                TaxBracket::new(dec!(0), Some(dec!(11925)), dec!(0.10)),
                TaxBracket::new(dec!(11925), Some(dec!(48475)), dec!(0.12)),
                TaxBracket::new(dec!(48475), Some(dec!(103350)), dec!(0.22)),
                TaxBracket::new(dec!(103350), Some(dec!(197300)), dec!(0.24)),
                TaxBracket::new(dec!(197300), Some(dec!(250525)), dec!(0.32)),
                TaxBracket::new(dec!(250525), Some(dec!(626350)), dec!(0.35)),
                TaxBracket::new(dec!(626350), None, dec!(0.37)),
            ],
        }
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    /// Tax owed on `net_gain`; 0 for non-positive gains
    pub fn tax_due(&self, net_gain: Decimal) -> Decimal {
        if net_gain <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let mut remaining = net_gain;
        let mut tax = Decimal::ZERO;
        for bracket in &self.brackets {
            if remaining <= Decimal::ZERO {
                break;
            }
            let taxable = match bracket.width() {
                Some(width) => remaining.min(width),
                None => remaining,
            };
            tax += taxable * bracket.rate;
            remaining -= taxable;
        }
        tax
    }

    /// Rate applied to the last dollar of `net_gain` (first bracket at 0)
    pub fn marginal_rate(&self, net_gain: Decimal) -> Decimal {
        let income = net_gain.max(Decimal::ZERO);
        self.brackets
            .iter()
            .find(|b| b.max.map_or(true, |max| income < max))
            .map(|b| b.rate)
            .unwrap_or(Decimal::ZERO)
    }
}

impl Default for BracketTable {
    fn default() -> Self {
        Self::us_2025_single()
    }
}
