//! CSV exports for the tax view
//!
//! Two files: a per-trade summary and a Form 8949 style listing of
//! resolved trades. Money is written with two decimals.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use csv::{QuoteStyle, WriterBuilder};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::report::TaxLot;
use super::TaxError;
use crate::types::TradeOutcome;

pub const SUMMARY_HEADER: [&str; 9] = [
    "Date",
    "Platform",
    "Market",
    "Position Size (USD)",
    "Profit/Loss (USD)",
    "Fees (USD)",
    "Net (USD)",
    "Trade Type",
    "Outcome",
];

pub const FORM_8949_HEADER: [&str; 7] = [
    "Description of Property",
    "Date Acquired",
    "Date Sold/Disposed",
    "Proceeds",
    "Cost Basis",
    "Gain or Loss",
    "Short/Long Term",
];

pub const DEFAULT_RESOLUTION_OFFSET_DAYS: i64 = 1;

/// Two decimals, half away from zero, always printed with both digits
pub fn money(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

fn iso_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn us_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

/// Fields are escaped by [`quoted`]/[`escaped`] before they reach the writer
fn writer() -> csv::Writer<Vec<u8>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new())
}

/// Always wrapped in double quotes, inner quotes doubled
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Quoted only when the field would otherwise break the row
fn escaped(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        quoted(field)
    } else {
        field.to_string()
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, TaxError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| TaxError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))?;
    Ok(String::from_utf8(bytes)?)
}

/// One row per lot, in input order
pub fn summary_csv(lots: &[TaxLot]) -> Result<String, TaxError> {
    let mut w = writer();
    w.write_record(SUMMARY_HEADER)?;
    for lot in lots {
        w.write_record([
            iso_date(lot.date),
            escaped(&lot.platform.to_string()),
            quoted(&lot.market),
            money(lot.position),
            money(lot.profit),
            money(lot.fees),
            money(lot.net()),
            escaped(&lot.strategy),
            escaped(&lot.outcome.to_string()),
        ])?;
    }
    finish(w)
}

/// A disposed position as reported on Form 8949
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form8949Row {
    pub description: String,
    pub date_acquired: NaiveDate,
    pub date_disposed: NaiveDate,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub gain_or_loss: Decimal,
}

impl Form8949Row {
    /// `None` unless the lot resolved and has an acquisition date whose
    /// disposal date is representable
    pub fn from_lot(lot: &TaxLot, resolution_offset: Duration) -> Option<Self> {
        if !matches!(lot.outcome, TradeOutcome::Won | TradeOutcome::Lost) {
            return None;
        }
        let acquired = lot.date?;
        let disposed = acquired.checked_add_signed(resolution_offset)?;
        let proceeds = lot.position + lot.profit;
        let cost_basis = lot.position + lot.fees;
        Some(Self {
            description: format!("{} ({})", lot.market, lot.platform),
            date_acquired: acquired.date_naive(),
            date_disposed: disposed.date_naive(),
            proceeds,
            cost_basis,
            gain_or_loss: proceeds - cost_basis,
        })
    }
}

/// Rows for resolved lots. Resolved lots without a usable date are
/// dropped and counted.
pub fn form_8949_rows(lots: &[TaxLot], resolution_offset: Duration) -> (Vec<Form8949Row>, usize) {
    let mut rows = Vec::new();
    let mut excluded = 0;
    for lot in lots.iter().filter(|l| l.outcome.is_decided()) {
        match Form8949Row::from_lot(lot, resolution_offset) {
            Some(row) => rows.push(row),
            None => excluded += 1,
        }
    }
    if excluded > 0 {
        warn!(
            excluded,
            "resolved trades without a usable date left out of Form 8949 export"
        );
    }
    (rows, excluded)
}

pub fn form_8949_csv(lots: &[TaxLot], resolution_offset: Duration) -> Result<String, TaxError> {
    let (rows, _) = form_8949_rows(lots, resolution_offset);
    let mut w = writer();
    w.write_record(FORM_8949_HEADER)?;
    for row in &rows {
        w.write_record([
            quoted(&row.description),
            us_date(row.date_acquired),
            us_date(row.date_disposed),
            money(row.proceeds),
            money(row.cost_basis),
            money(row.gain_or_loss),
            "Short-term".to_string(),
        ])?;
    }
    finish(w)
}
