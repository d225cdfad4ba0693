//! CSV Persistence Module
//!
//! Reads the ledger the execution engine writes to disk and stores tax
//! exports next to it.
//!
//! Layout under the data directory:
//! - `trades/*.csv`: one row per trade attempt, any column subset
//! - `opportunities/*.csv`: scanner output
//! - `snapshot.json`: cached aggregate rollup (optional)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::ledger::{LedgerError, LedgerSource, RawOpportunityRow, RawTradeRow};
use crate::types::AggregateSnapshot;

pub const TRADES_DIR: &str = "trades";
pub const OPPORTUNITIES_DIR: &str = "opportunities";
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// File-backed ledger
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    data_dir: PathBuf,
    export_dir: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(data_dir: impl Into<PathBuf>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            export_dir: export_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.ledger.data_dir, &config.tax.export_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// CSV files in `folder`, oldest name first. A missing folder is empty.
    async fn csv_files(&self, folder: &str) -> Result<Vec<PathBuf>, LedgerError> {
        let dir = self.data_dir.join(folder);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "ledger folder missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("csv")
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Deserialize every row of every file. Cells are kept as the exact
    /// text in the file so identifiers like `007` or 78-digit token ids
    /// survive; numeric coercion is left to the classifier. Rows that do
    /// not parse as CSV are skipped and counted.
    async fn read_rows<T: DeserializeOwned>(&self, folder: &str) -> Result<Vec<T>, LedgerError> {
        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for path in self.csv_files(folder).await? {
            let bytes = tokio::fs::read(&path).await?;
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(bytes.as_slice());
            for result in reader.deserialize::<HashMap<String, String>>() {
                match result.map_err(LedgerError::from).and_then(text_row) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        skipped += 1;
                        warn!(file = %path.display(), error = %e, "Skipping unreadable ledger row");
                    }
                }
            }
        }
        debug!(folder, rows = rows.len(), skipped, "Ledger rows read");
        Ok(rows)
    }

    /// Write an export file into the export directory, replacing any
    /// previous file of the same name
    pub fn write_export(&self, filename: &str, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.export_dir).with_context(|| {
            format!("Failed to create export directory {}", self.export_dir.display())
        })?;
        let path = self.export_dir.join(filename);
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write export {}", path.display()))?;
        info!(path = %path.display(), bytes = contents.len(), "Export written");
        Ok(path)
    }
}

/// Header → cell map into a raw row with every non-blank cell as a JSON
/// string. Blank cells are absent.
fn text_row<T: DeserializeOwned>(cells: HashMap<String, String>) -> Result<T, LedgerError> {
    let object: serde_json::Map<String, Value> = cells
        .into_iter()
        .filter(|(_, cell)| !cell.is_empty())
        .map(|(column, cell)| (column, Value::String(cell)))
        .collect();
    Ok(serde_json::from_value(Value::Object(object))?)
}

#[async_trait]
impl LedgerSource for CsvLedgerStore {
    async fn load_trades(&self) -> Result<Vec<RawTradeRow>, LedgerError> {
        self.read_rows(TRADES_DIR).await
    }

    async fn load_snapshot(&self) -> Result<Option<AggregateSnapshot>, LedgerError> {
        let path = self.data_dir.join(SNAPSHOT_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn load_opportunities(&self) -> Result<Vec<RawOpportunityRow>, LedgerError> {
        self.read_rows(OPPORTUNITIES_DIR).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{load_ledger, FetchPolicy};
    use crate::types::{Platform, TradeOutcome, Venue};

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "polyledger_persistence_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn missing_data_dir_is_an_empty_ledger() {
        let dir = temp_data_dir("missing");
        let store = CsvLedgerStore::new(&dir, dir.join("exports"));
        assert!(store.load_trades().await.unwrap().is_empty());
        assert!(store.load_snapshot().await.unwrap().is_none());
        assert!(store.load_opportunities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_partial_columns_across_files() {
        let dir = temp_data_dir("partial");
        write(
            &dir,
            "trades/trades_2025-03-01.csv",
            "id,created_at,platform,actual_profit_usd,outcome\n\
             a,2025-03-01T10:00:00Z,kalshi,12.5,won\n",
        );
        write(
            &dir,
            "trades/trades_2025-03-02.csv",
            "id,polymarket_token_id,actual_profit_usd,status,total_fees_usd\n\
             b,0xabc,-3,settled,0.25\n",
        );
        write(&dir, "trades/notes.txt", "ignored");
        write(
            &dir,
            "snapshot.json",
            r#"{"total_pnl": 9.25, "total_trades": 2, "total_opportunities_seen": 40}"#,
        );

        let store = CsvLedgerStore::new(&dir, dir.join("exports"));
        let view = load_ledger(&store, &FetchPolicy::default()).await.unwrap();

        assert_eq!(view.trades.len(), 2);
        let a = view.trades.iter().find(|t| t.id == "a").unwrap();
        assert_eq!(a.platform(), Platform::Kalshi);
        assert_eq!(a.outcome, TradeOutcome::Won);
        assert_eq!(a.total_fees_usd, None);

        let b = view.trades.iter().find(|t| t.id == "b").unwrap();
        assert_eq!(b.platform(), Platform::Polymarket);
        assert_eq!(b.outcome, TradeOutcome::Lost);
        assert_eq!(b.total_fees_usd, Some(0.25));

        assert_eq!(view.snapshot.as_ref().unwrap().total_pnl, Some(9.25));
        assert_eq!(view.opportunities.total_count, Some(40));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn identifier_cells_keep_their_text() {
        let dir = temp_data_dir("identifiers");
        let token = "52114319501245915516055106046884209969926127482827954674443846427813813222426";
        write(
            &dir,
            "trades/t.csv",
            &format!(
                "id,polymarket_token_id,market_title,actual_profit_usd,outcome\n\
                 007,{},2024,1,won\n",
                token
            ),
        );
        let store = CsvLedgerStore::new(&dir, dir.join("exports"));
        let view = load_ledger(&store, &FetchPolicy::default()).await.unwrap();

        let trade = &view.trades[0];
        assert_eq!(trade.id, "007");
        assert_eq!(trade.market, "2024");
        assert_eq!(trade.actual_profit_usd, 1.0);
        assert_eq!(
            trade.venue,
            Venue::Polymarket {
                token_id: Some(token.to_string()),
                condition_id: None,
            }
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = temp_data_dir("corrupt_snapshot");
        write(&dir, "snapshot.json", "{not json");
        let store = CsvLedgerStore::new(&dir, dir.join("exports"));
        assert!(matches!(store.load_snapshot().await, Err(LedgerError::Json(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_export_creates_directory() {
        let dir = temp_data_dir("export");
        let store = CsvLedgerStore::new(&dir, dir.join("exports").join("2025"));
        let path = store.write_export("summary.csv", "Date\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Date\n");

        let path = store.write_export("summary.csv", "Date,Platform\n").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "Date,Platform\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
