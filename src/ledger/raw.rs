//! Raw ledger rows
//!
//! Rows arrive from heterogeneous venues: numbers may be JSON numbers or
//! strings, timestamps come in several formats and most columns are
//! optional. Nothing here fails; bad cells degrade to `None`/0 and are
//! counted in [`ClassifierDiagnostics`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw trade row as stored by the execution engine.
/// Every column is optional; CSV files may carry any subset of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTradeRow {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub platform: Option<Value>,
    #[serde(default)]
    pub kalshi_ticker: Option<Value>,
    #[serde(default)]
    pub polymarket_token_id: Option<Value>,
    #[serde(default)]
    pub polymarket_condition_id: Option<Value>,
    #[serde(default)]
    pub market_title: Option<Value>,
    #[serde(default)]
    pub polymarket_market_title: Option<Value>,
    #[serde(default)]
    pub kalshi_market_title: Option<Value>,
    #[serde(default)]
    pub side: Option<Value>,
    #[serde(default)]
    pub position_size_usd: Option<Value>,
    #[serde(default)]
    pub expected_profit_usd: Option<Value>,
    #[serde(default)]
    pub actual_profit_usd: Option<Value>,
    #[serde(default)]
    pub total_fees_usd: Option<Value>,
    #[serde(default)]
    pub outcome: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub strategy_type: Option<Value>,
    #[serde(default)]
    pub trade_type: Option<Value>,
}

/// Raw opportunity row from the scanner log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOpportunityRow {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub detected_at: Option<Value>,
    #[serde(default)]
    pub strategy: Option<Value>,
    #[serde(default)]
    pub profit_percent: Option<Value>,
    #[serde(default)]
    pub buy_price: Option<Value>,
    #[serde(default)]
    pub sell_price: Option<Value>,
    #[serde(default)]
    pub buy_market_name: Option<Value>,
}

/// Counts of cells the classifier had to repair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierDiagnostics {
    /// Rows processed
    pub rows: u64,
    /// Numeric cells that were absent and defaulted to 0
    pub missing_fields: u64,
    /// Numeric cells present but unparseable, coerced to 0
    pub malformed_fields: u64,
    /// Timestamps that could not be parsed
    pub unparseable_dates: u64,
    /// Rows whose platform was inferred from venue identifiers
    pub inferred_platforms: u64,
}

impl ClassifierDiagnostics {
    pub fn coerced_fields(&self) -> u64 {
        self.missing_fields + self.malformed_fields
    }

    pub fn merge(&mut self, other: &ClassifierDiagnostics) {
        self.rows += other.rows;
        self.missing_fields += other.missing_fields;
        self.malformed_fields += other.malformed_fields;
        self.unparseable_dates += other.unparseable_dates;
        self.inferred_platforms += other.inferred_platforms;
    }
}

/// `parseFloat` semantics: parse the longest numeric prefix, ignoring
/// leading whitespace. Returns `None` when there is no prefix or the value
/// is not finite.
pub fn parse_float_lenient(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut end = 0;

    if end < len && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < len && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if end < len && bytes[end] == b'.' {
        let dot = end;
        end += 1;
        let frac_start = end;
        while end < len && bytes[end].is_ascii_digit() {
            end += 1;
        }
        mantissa_digits += end - frac_start;
        if end == frac_start && mantissa_digits == 0 {
            end = dot;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if end < len && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < len && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < len && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric cell → f64, defaulting to 0
pub fn coerce_f64(value: Option<&Value>, diag: &mut ClassifierDiagnostics) -> f64 {
    match coerce_opt_f64(value, diag) {
        Some(v) => v,
        None => {
            diag.missing_fields += 1;
            0.0
        }
    }
}

/// Numeric cell → `Some(f64)` when present. Present-but-malformed cells
/// become `Some(0.0)`; absent or blank cells are `None`.
pub fn coerce_opt_f64(value: Option<&Value>, diag: &mut ClassifierDiagnostics) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_f64().filter(|v| v.is_finite()) {
            Some(v) => Some(v),
            None => {
                diag.malformed_fields += 1;
                Some(0.0)
            }
        },
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => match parse_float_lenient(s) {
            Some(v) => Some(v),
            None => {
                diag.malformed_fields += 1;
                Some(0.0)
            }
        },
        Some(_) => {
            diag.malformed_fields += 1;
            Some(0.0)
        }
    }
}

/// Text cell → trimmed non-empty string. Numbers are rendered as text.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Timestamp cell → UTC instant.
/// Accepts RFC 3339, Postgres-style `2025-01-15 10:00:00+00`, naive
/// datetimes (assumed UTC), plain dates and epoch seconds/millis.
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => {
            let raw = n.as_f64()?;
            epoch_to_utc(raw)
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<f64>().ok().and_then(epoch_to_utc);
    }
    None
}

fn epoch_to_utc(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    // Anything past ~1973 in millis is far beyond any plausible seconds value
    let millis = if raw > 100_000_000_000.0 {
        raw as i64
    } else {
        (raw * 1000.0) as i64
    };
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_parse_follows_parse_float() {
        assert_eq!(parse_float_lenient("12.5"), Some(12.5));
        assert_eq!(parse_float_lenient("  -3.25abc"), Some(-3.25));
        assert_eq!(parse_float_lenient(".5"), Some(0.5));
        assert_eq!(parse_float_lenient("7."), Some(7.0));
        assert_eq!(parse_float_lenient("1e3x"), Some(1000.0));
        assert_eq!(parse_float_lenient("2e"), Some(2.0));
        assert_eq!(parse_float_lenient("$10"), None);
        assert_eq!(parse_float_lenient("abc"), None);
        assert_eq!(parse_float_lenient("."), None);
        assert_eq!(parse_float_lenient("-"), None);
        assert_eq!(parse_float_lenient("1e999"), None);
    }

    #[test]
    fn coerce_counts_missing_and_malformed() {
        let mut diag = ClassifierDiagnostics::default();
        assert_eq!(coerce_f64(None, &mut diag), 0.0);
        assert_eq!(coerce_f64(Some(&json!("oops")), &mut diag), 0.0);
        assert_eq!(coerce_f64(Some(&json!("4.5")), &mut diag), 4.5);
        assert_eq!(coerce_f64(Some(&json!(2)), &mut diag), 2.0);
        assert_eq!(coerce_f64(Some(&json!(true)), &mut diag), 0.0);
        assert_eq!(diag.missing_fields, 1);
        assert_eq!(diag.malformed_fields, 2);
        assert_eq!(diag.coerced_fields(), 3);
    }

    #[test]
    fn blank_optional_cell_is_absent() {
        let mut diag = ClassifierDiagnostics::default();
        assert_eq!(coerce_opt_f64(Some(&json!("  ")), &mut diag), None);
        assert_eq!(coerce_opt_f64(Some(&Value::Null), &mut diag), None);
        assert_eq!(diag.malformed_fields, 0);
    }

    #[test]
    fn timestamps_in_common_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        for raw in [
            "2025-03-01T12:30:00Z",
            "2025-03-01T12:30:00.000+00:00",
            "2025-03-01 12:30:00+00",
            "2025-03-01 12:30:00",
        ] {
            assert_eq!(parse_timestamp(Some(&json!(raw))), Some(expected), "{}", raw);
        }
        assert_eq!(
            parse_timestamp(Some(&json!(expected.timestamp_millis()))),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(Some(&json!(expected.timestamp()))),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(Some(&json!("2025-03-01"))),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(Some(&json!("yesterday"))), None);
    }

    #[test]
    fn text_trims_and_renders_numbers() {
        assert_eq!(text(Some(&json!("  KXBTC "))), Some("KXBTC".to_string()));
        assert_eq!(text(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(text(Some(&json!(""))), None);
        assert_eq!(text(None), None);
    }
}
