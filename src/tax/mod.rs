//! Tax estimation
//!
//! Date-filtered view of the classified ledger: fee estimation,
//! short-term aggregation, progressive brackets and CSV exports.

pub mod brackets;
pub mod export;
pub mod fees;
pub mod period;
pub mod report;

pub use brackets::{BracketTable, TaxBracket};
pub use export::{form_8949_csv, form_8949_rows, money, summary_csv, Form8949Row};
pub use fees::{FeeAssessment, FeePolicy};
pub use period::{DateRange, PlatformFilter, ResolvedTaxQuery, TaxPeriod, TaxQuery};
pub use report::{
    build_lots, monthly_breakdown, platform_breakdown, strategy_breakdown, usd, LotTotals,
    MonthlyBreakdown, PlatformBreakdown, StrategyBreakdown, TaxEngine, TaxLot, TaxReport,
    TaxSummary,
};

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Platform;

#[derive(Debug, Error)]
pub enum TaxError {
    #[error("invalid bracket table: {0}")]
    InvalidBrackets(String),

    #[error("fee rate {rate} for {platform} outside [0, 1]")]
    InvalidFeeRate { platform: Platform, rate: Decimal },

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("export buffer: {0}")]
    Io(#[from] std::io::Error),

    #[error("export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
