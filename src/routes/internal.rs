use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::services::{messaging, refresh, sequences};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/internal/refresh", axum::routing::post(trigger_refresh))
        .route(
            "/internal/outreach/process",
            axum::routing::post(trigger_outreach),
        )
}

/// Recompute the revenue snapshot on demand (deploys, data backfills).
async fn trigger_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;
    let summary = refresh::refresh_revenue_snapshot(&state).await?;
    Ok(Json(json!({ "status": "refreshed", "summary": summary })))
}

/// Run one outreach cycle now instead of waiting for the scheduler.
async fn trigger_outreach(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Warehouse database is not configured. Set WAREHOUSE_DB_URL or DATABASE_URL."
                .to_string(),
        )
    })?;

    let (enrolled, excluded) = sequences::poll_new_signups(&state).await;
    let (queued, step_errors) = sequences::process_due_steps(pool).await;
    let (sent, send_failures) =
        messaging::process_queued_messages(pool, &state.http_client, &state.config).await;

    Ok(Json(json!({
        "status": "processed",
        "enrolled": enrolled,
        "excluded": excluded,
        "queued": queued,
        "sent": sent,
        "errors": step_errors + send_failures,
    })))
}

fn require_internal_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let expected = state.config.internal_api_key.as_deref().unwrap_or_default();
    if expected.is_empty() {
        return Err(AppError::Forbidden(
            "Internal API key is not configured.".to_string(),
        ));
    }
    let provided = headers
        .get("x-internal-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return Err(AppError::Unauthorized(
            "Invalid internal API key.".to_string(),
        ));
    }
    Ok(())
}
