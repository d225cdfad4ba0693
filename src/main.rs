//! PolyLedger - ledger metrics and tax estimation
//!
//! Usage:
//!   polyledger [report]
//!   polyledger tax [ytd|<year>|custom <start> <end>] [all|polymarket|kalshi]
//!   polyledger serve            (requires the `dashboard` feature)

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use polyledger::config::AppConfig;
use polyledger::ledger::load_ledger;
use polyledger::metrics::build_report;
use polyledger::persistence::CsvLedgerStore;
use polyledger::tax::{form_8949_csv, summary_csv, TaxQuery};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config);

    info!("PolyLedger v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config.digest());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("report") => run_report(&config).await,
        Some("tax") => run_tax(&config, &args[1..]).await,
        Some("serve") => serve(&config).await,
        Some(other) => bail!("Unknown command '{}' (expected report, tax or serve)", other),
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run_report(config: &AppConfig) -> Result<()> {
    let store = CsvLedgerStore::from_config(config);
    let view = load_ledger(&store, &config.ledger.fetch_policy())
        .await
        .context("Failed to load ledger")?;
    let report = build_report(&view, &config.metrics_settings()?, Utc::now());

    info!(
        net_pnl = report.balance.net_pnl,
        current_balance = report.balance.current_balance,
        win_rate = report.balance.win_rate,
        fee_override = report.reconciled.fee_override,
        "Metrics report built"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `tax [period] [platform]`, or `tax custom <start> <end> [platform]`
fn parse_tax_args(args: &[String]) -> TaxQuery {
    let mut query = TaxQuery {
        period: args.first().cloned(),
        ..Default::default()
    };
    let rest = if query.period.as_deref() == Some("custom") {
        query.start = args.get(1).cloned();
        query.end = args.get(2).cloned();
        args.get(3..).unwrap_or_default()
    } else {
        args.get(1..).unwrap_or_default()
    };
    query.platform = rest.first().cloned();
    query
}

async fn run_tax(config: &AppConfig, args: &[String]) -> Result<()> {
    let store = CsvLedgerStore::from_config(config);
    let view = load_ledger(&store, &config.ledger.fetch_policy())
        .await
        .context("Failed to load ledger")?;
    let engine = config.tax_engine()?;
    let query = parse_tax_args(args).resolve(Utc::now());
    let report = engine.report(&view.trades, &query);

    let suffix = format!("{}_{}", query.period, query.platform);
    let summary = store.write_export(
        &format!("tax_summary_{}.csv", suffix),
        &summary_csv(&report.lots)?,
    )?;
    let form = store.write_export(
        &format!("form_8949_{}.csv", suffix),
        &form_8949_csv(&report.lots, config.tax.resolution_offset())?,
    )?;

    info!(
        summary = %summary.display(),
        form_8949 = %form.display(),
        tax_due = %report.summary.tax_due,
        "Tax exports written"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(feature = "dashboard")]
async fn serve(config: &AppConfig) -> Result<()> {
    use polyledger::dashboard::{create_router, DashboardState};
    use std::sync::Arc;

    let state = DashboardState::new(
        Arc::new(CsvLedgerStore::from_config(config)),
        config.ledger.fetch_policy(),
        config.metrics_settings()?,
        config.tax_engine()?,
        config.tax.resolution_offset(),
    );
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.dashboard.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.dashboard.bind_addr))?;
    info!("Dashboard API listening on http://{}", config.dashboard.bind_addr);
    axum::serve(listener, app).await.context("Dashboard server failed")?;
    Ok(())
}

#[cfg(not(feature = "dashboard"))]
async fn serve(_config: &AppConfig) -> Result<()> {
    bail!("Built without the `dashboard` feature; rebuild with --features dashboard")
}
