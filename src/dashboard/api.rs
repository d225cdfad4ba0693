//! Dashboard HTTP API
//!
//! REST endpoints for the metrics and tax pages.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use super::types::*;
use super::DashboardState;
use crate::ledger::LedgerError;
use crate::metrics::{analyze, build_report};
use crate::tax::{form_8949_csv, summary_csv, TaxError, TaxQuery};

const DEFAULT_OPPORTUNITY_LIMIT: usize = 50;

/// Create the API router with all endpoints
pub fn create_router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/api/metrics", get(get_metrics))
        .route("/api/opportunities", get(get_opportunities))
        .route("/api/tax", get(get_tax))
        // CSV downloads
        .route("/api/tax/export/summary", get(export_summary))
        .route("/api/tax/export/form8949", get(export_form_8949))
        .with_state(state)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn ledger_unavailable(e: LedgerError) -> Response {
    warn!(error = %e, "Ledger unavailable for dashboard request");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::<()>::error(e.to_string())),
    )
        .into_response()
}

fn export_failed(e: TaxError) -> Response {
    warn!(error = %e, "Tax export failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error(e.to_string())),
    )
        .into_response()
}

fn csv_download(filename: String, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// GET /api/metrics - Reconciled metrics, balance, distribution and funnel
async fn get_metrics(State(state): State<Arc<DashboardState>>) -> Response {
    match state.view().await {
        Ok(view) => Json(ApiResponse::success(build_report(
            &view,
            &state.metrics,
            Utc::now(),
        )))
        .into_response(),
        Err(e) => ledger_unavailable(e),
    }
}

/// GET /api/opportunities?limit= - Funnel plus the most recent real signals
async fn get_opportunities(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<OpportunitiesQuery>,
) -> Response {
    let view = match state.view().await {
        Ok(view) => view,
        Err(e) => return ledger_unavailable(e),
    };
    let funnel = analyze(&view.opportunities, &view.trades);
    let limit = query.limit.unwrap_or(DEFAULT_OPPORTUNITY_LIMIT);
    let mut recent: Vec<_> = view
        .opportunities
        .records
        .iter()
        .filter(|o| crate::metrics::is_real_signal(o))
        .cloned()
        .collect();
    recent.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
    recent.truncate(limit);

    Json(ApiResponse::success(OpportunitiesResponse { funnel, recent })).into_response()
}

/// GET /api/tax?period=&start=&end=&platform=
async fn get_tax(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<TaxQuery>,
) -> Response {
    match state.view().await {
        Ok(view) => {
            let resolved = query.resolve(Utc::now());
            Json(ApiResponse::success(state.tax.report(&view.trades, &resolved))).into_response()
        }
        Err(e) => ledger_unavailable(e),
    }
}

/// GET /api/tax/export/summary
async fn export_summary(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<TaxQuery>,
) -> Response {
    let (resolved, lots) = match state.tax_lots(&query, Utc::now()).await {
        Ok(found) => found,
        Err(e) => return ledger_unavailable(e),
    };
    match summary_csv(&lots) {
        Ok(body) => csv_download(
            format!("tax_summary_{}_{}.csv", resolved.period, resolved.platform),
            body,
        ),
        Err(e) => export_failed(e),
    }
}

/// GET /api/tax/export/form8949
async fn export_form_8949(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<TaxQuery>,
) -> Response {
    let (resolved, lots) = match state.tax_lots(&query, Utc::now()).await {
        Ok(found) => found,
        Err(e) => return ledger_unavailable(e),
    };
    match form_8949_csv(&lots, state.resolution_offset) {
        Ok(body) => csv_download(
            format!("form_8949_{}_{}.csv", resolved.period, resolved.platform),
            body,
        ),
        Err(e) => export_failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{FetchPolicy, LedgerSource, RawOpportunityRow, RawTradeRow};
    use crate::metrics::MetricsSettings;
    use crate::tax::TaxEngine;
    use crate::types::AggregateSnapshot;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct StaticLedger {
        trades: Vec<Value>,
        fail: bool,
    }

    #[async_trait]
    impl LedgerSource for StaticLedger {
        async fn load_trades(&self) -> Result<Vec<RawTradeRow>, LedgerError> {
            if self.fail {
                return Err(LedgerError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "down",
                )));
            }
            Ok(self
                .trades
                .iter()
                .map(|v| serde_json::from_value(v.clone()).unwrap())
                .collect())
        }

        async fn load_snapshot(&self) -> Result<Option<AggregateSnapshot>, LedgerError> {
            Ok(None)
        }

        async fn load_opportunities(&self) -> Result<Vec<RawOpportunityRow>, LedgerError> {
            Ok(vec![serde_json::from_value(json!({
                "strategy": "cross",
                "profit_percent": 2.5,
                "buy_market_name": "BTC up"
            }))
            .unwrap()])
        }
    }

    fn router(fail: bool) -> Router {
        let this_year = Utc::now().format("%Y").to_string();
        let source = StaticLedger {
            trades: vec![
                json!({"id": "1", "created_at": format!("{}-01-01T00:00:00Z", this_year),
                       "platform": "kalshi", "position_size_usd": 50, "actual_profit_usd": 10,
                       "outcome": "won", "market_title": "Fed cuts"}),
                json!({"id": "2", "created_at": format!("{}-01-01T00:00:00Z", this_year),
                       "platform": "polymarket", "position_size_usd": 40, "actual_profit_usd": -4,
                       "total_fees_usd": 0, "outcome": "lost"}),
            ],
            fail,
        };
        let state = DashboardState::new(
            Arc::new(source),
            FetchPolicy {
                retries: 0,
                ..Default::default()
            },
            MetricsSettings::default(),
            TaxEngine::default(),
            chrono::Duration::days(1),
        );
        create_router(Arc::new(state))
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_endpoint_wraps_report() {
        let (status, body) = get(router(false), "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["balance"]["winning_trades"], 1);
        assert_eq!(value["data"]["balance"]["net_pnl"], 6.0);
    }

    #[tokio::test]
    async fn tax_endpoint_filters_platform() {
        let (status, body) = get(router(false), "/api/tax?platform=kalshi").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["data"]["summary"]["trades"], 1);
        // 10 profit minus the estimated 7% Kalshi fee
        let net: rust_decimal::Decimal = value["data"]["summary"]["net_pnl"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(net, rust_decimal_macros::dec!(9.3));
    }

    #[tokio::test]
    async fn opportunities_endpoint_reports_funnel() {
        let (_, body) = get(router(false), "/api/opportunities?limit=5").await;
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["data"]["funnel"]["real_signals"], 1);
        assert_eq!(value["data"]["recent"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exports_are_csv_downloads() {
        let (status, body) = get(router(false), "/api/tax/export/form8949").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("Description of Property,Date Acquired,"));
        assert_eq!(body.lines().count(), 3);

        let (_, body) = get(router(false), "/api/tax/export/summary?platform=polymarket").await;
        assert_eq!(body.lines().count(), 2);
    }

    #[tokio::test]
    async fn ledger_failure_is_service_unavailable() {
        let (status, body) = get(router(true), "/api/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"success\":false"));
    }
}
