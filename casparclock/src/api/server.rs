//! HTTP server for the controller
//!
//! Every handler is a thin pass-through to [`Session`]; only input validation
//! happens here. Session operations are fail-open, so validation is the only
//! way a request can fail.

use super::error::{ApiError, ApiResult};
use crate::session::Session;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use caspar_amcp::{
    AutoUpdateResponse, ClockState, ClockUpdateResult, ConnectionStatus,
    ConnectionStatusDetails, ToggleResponse, API_PREFIX,
};
use serde_json::Value;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(session: Session) -> Router {
    let routes = Router::new()
        .route("/connect", post(connect))
        .route("/clock/update", post(update_clock))
        .route("/clock/toggle", post(toggle_overlay))
        .route("/settings/auto-update", post(set_auto_update))
        .route("/status", get(status))
        .route("/state", get(state));

    Router::new()
        .nest(API_PREFIX, routes)
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(bind: &str, session: Session, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind HTTP server to {bind}"))?;
    info!("HTTP API listening on http://{}{}", listener.local_addr()?, API_PREFIX);

    axum::serve(listener, router(session))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

/// Pull a required boolean field out of a JSON body
fn bool_field(body: &Bytes, field: &str) -> ApiResult<bool> {
    let invalid = || ApiError::validation(format!("Invalid request: '{field}' must be a boolean"));
    let value: Value = serde_json::from_slice(body).map_err(|_| invalid())?;
    value.get(field).and_then(Value::as_bool).ok_or_else(invalid)
}

async fn connect(State(session): State<Session>) -> Json<ConnectionStatus> {
    Json(session.connect().await)
}

async fn update_clock(State(session): State<Session>) -> Json<ClockUpdateResult> {
    Json(session.update_clock().await)
}

async fn toggle_overlay(
    State(session): State<Session>,
    body: Bytes,
) -> ApiResult<Json<ToggleResponse>> {
    let visible = bool_field(&body, "visible")?;
    let success = session.toggle_overlay(visible).await;
    Ok(Json(ToggleResponse { success, visible }))
}

async fn set_auto_update(
    State(session): State<Session>,
    body: Bytes,
) -> ApiResult<Json<AutoUpdateResponse>> {
    let enabled = bool_field(&body, "enabled")?;
    let success = session.set_auto_update(enabled).await;
    Ok(Json(AutoUpdateResponse {
        success,
        auto_update_enabled: enabled,
    }))
}

async fn status(State(session): State<Session>) -> Json<ConnectionStatusDetails> {
    Json(session.status().await)
}

async fn state(State(session): State<Session>) -> Json<ClockState> {
    Json(session.state().await)
}
