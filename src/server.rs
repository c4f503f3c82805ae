// ============================================================================
// HTTP EXPOSITION SERVER
// ============================================================================
// GET /metrics  Prometheus text of the current store snapshot
// GET /health   liveness, always 200 while the process serves
// GET /ready    200 once the scheduler is running, 503 otherwise
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::exposition;
use crate::metrics::MetricsStore;
use crate::scheduler::SchedulerStatus;
use crate::{SERVICE_NAME, SERVICE_VERSION};

/// Shared state of the serving unit. Only reads the store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricsStore>,
    pub status: Arc<SchedulerStatus>,
}

impl AppState {
    pub fn new(store: Arc<MetricsStore>, status: Arc<SchedulerStatus>) -> Self {
        Self { store, status }
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    timestamp: String,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadyBody {
    status: &'static str,
    service: &'static str,
    timestamp: String,
    scheduler: &'static str,
    cycles_run: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `cancel` fires, then drain open connections.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(target: "snaproom::server", %addr, "Metrics server listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(ServerError::Serve)?;

    info!(target: "snaproom::server", "Metrics server stopped");
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    let body = exposition::render(&snapshot);
    debug!(
        target: "snaproom::server",
        families = snapshot.families().len(),
        bytes = body.len(),
        "Rendered metrics"
    );
    ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response()
}

async fn health_handler() -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        service: SERVICE_NAME,
        timestamp: now_rfc3339(),
        version: SERVICE_VERSION,
    })
}

async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let (code, status) = if state.status.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    let body = ReadyBody {
        status,
        service: SERVICE_NAME,
        timestamp: now_rfc3339(),
        scheduler: state.status.state().as_str(),
        cycles_run: state.status.cycles_run(),
    };
    (code, Json(body))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
