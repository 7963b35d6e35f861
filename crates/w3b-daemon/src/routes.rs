//! Axum router and all HTTP handlers for w3b-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Trigger authentication (webhook secrets, operator
//! signatures) is enforced in front of this service.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};
use w3b_runtime::{ErrorKind, ReconciliationRequest, TriggerInput};

use crate::{
    api_types::{ErrorResponse, HealthResponse},
    state::{spawn_price_run, spawn_reserve_run, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/reconcile", post(reconcile))
        .route("/v1/price/sync", post(price_sync))
        .route("/v1/reports/last", get(last_report))
        .with_state(state)
}

/// HTTP status for a finished run.
pub fn status_for(error: Option<ErrorKind>) -> StatusCode {
    match error {
        None => StatusCode::OK,
        Some(ErrorKind::InvariantViolation) => StatusCode::CONFLICT,
        Some(ErrorKind::Layout | ErrorKind::AccountNotFound | ErrorKind::PriceRejected) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Some(ErrorKind::DataSource | ErrorKind::Transaction | ErrorKind::PriceSource) => {
            StatusCode::BAD_GATEWAY
        }
        Some(ErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.status().await))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile(
    State(st): State<Arc<AppState>>,
    body: Result<Json<TriggerInput>, JsonRejection>,
) -> Response {
    let input = match body {
        Ok(Json(input)) => input,
        Err(rej) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("TRIGGER_INVALID: {}", rej.body_text()),
            )
        }
    };

    let req = ReconciliationRequest::from(input);
    info!(trigger = req.source.label(), "reconcile requested");

    match spawn_reserve_run(Arc::clone(&st), req).await {
        Ok(report) => (status_for(report.error_kind()), Json(report)).into_response(),
        Err(e) => {
            error!("reconcile task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "reconcile task failed")
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/price/sync
// ---------------------------------------------------------------------------

pub(crate) async fn price_sync(State(st): State<Arc<AppState>>) -> Response {
    let Some(run) = spawn_price_run(Arc::clone(&st)) else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "PRICE_SYNC_DISABLED: price.source_url is not configured",
        );
    };

    match run.await {
        Ok(report) => {
            let kind = report.error.as_ref().map(|e| e.kind);
            (status_for(kind), Json(report)).into_response()
        }
        Err(e) => {
            error!("price task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "price task failed")
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/reports/last
// ---------------------------------------------------------------------------

pub(crate) async fn last_report(State(st): State<Arc<AppState>>) -> Response {
    match st.last_report.read().await.clone() {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no run has finished yet"),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::LogLine { .. } => "log",
                    BusMsg::Report(_) => "report",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
