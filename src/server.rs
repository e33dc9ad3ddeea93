//! HTTP interface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::charts::{ChartList, ChartRecord, ChartStore, ChartUpdate, NewChart};
use crate::dataset::parse_date_param;
use crate::engine::KpiEngine;
use crate::envelope::KpiEnvelope;
use crate::error::{ChartError, KpiError};
use crate::kpis::MetricKey;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<KpiEngine>,
    pub charts: ChartStore,
}

#[derive(Debug, Default, Deserialize)]
pub struct KpiQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/operations-kpis", get(operations_kpis))
        .route("/api/charts", get(list_charts).post(create_chart))
        .route(
            "/api/charts/:chart_id",
            get(get_chart).put(update_chart).delete(delete_chart),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Serves `app` on `listener` until Ctrl+C.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
}

async fn root() -> Json<serde_json::Value> {
    let kpis: Vec<_> = MetricKey::ALL
        .iter()
        .map(|k| json!({"key": k.as_str(), "title": k.title()}))
        .collect();

    Json(json!({
        "message": "Fleet Operations KPI Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "operations_kpis": "/api/operations-kpis?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD",
            "health": "/health",
            "charts": "/api/charts",
        },
        "kpis": kpis,
    }))
}

async fn health(State(state): State<AppState>) -> Response {
    let source = state.engine.source_name();
    let timestamp = Utc::now().to_rfc3339();

    match state.engine.health().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "source": source,
            "timestamp": timestamp,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "source": source,
                    "error": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
                .into_response()
        }
    }
}

async fn operations_kpis(
    State(state): State<AppState>,
    Query(query): Query<KpiQuery>,
) -> Result<Json<KpiEnvelope>, KpiError> {
    let start = parse_date_param("start_date", query.start_date.as_deref())?;
    let end = parse_date_param("end_date", query.end_date.as_deref())?;

    let report = state.engine.extract(start, end).await?;
    Ok(Json(KpiEnvelope::from_report(report)))
}

async fn list_charts(State(state): State<AppState>) -> Result<Json<ChartList>, ChartError> {
    Ok(Json(state.charts.list().await?))
}

async fn create_chart(
    State(state): State<AppState>,
    Json(request): Json<NewChart>,
) -> Result<Json<ChartRecord>, ChartError> {
    Ok(Json(state.charts.create(request).await?))
}

async fn get_chart(
    State(state): State<AppState>,
    Path(chart_id): Path<String>,
) -> Result<Json<ChartRecord>, ChartError> {
    Ok(Json(state.charts.get(&chart_id).await?))
}

async fn update_chart(
    State(state): State<AppState>,
    Path(chart_id): Path<String>,
    Json(update): Json<ChartUpdate>,
) -> Result<Json<ChartRecord>, ChartError> {
    Ok(Json(state.charts.update(&chart_id, update).await?))
}

async fn delete_chart(
    State(state): State<AppState>,
    Path(chart_id): Path<String>,
) -> Result<Json<serde_json::Value>, ChartError> {
    state.charts.remove(&chart_id).await?;
    Ok(Json(json!({"success": true, "message": "Chart deleted successfully"})))
}
