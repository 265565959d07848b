use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::repository::warehouse;
use crate::schemas::ReceiptQuery;
use crate::services::receipts::build_receipt;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/payouts/receipt", axum::routing::get(receipt))
}

/// Receipt data for one (app, month): per-platform unit counts and unit
/// prices re-derived from the breakdown snapshot, plus invoice metadata.
/// The PDF renderer consumes this verbatim.
async fn receipt(
    State(state): State<AppState>,
    Query(query): Query<ReceiptQuery>,
) -> AppResult<Json<Value>> {
    let app = query.app.trim();
    let month = query.month.trim();
    if app.is_empty() {
        return Err(AppError::BadRequest("app is required.".to_string()));
    }
    NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!("Invalid month '{month}', expected YYYY-MM."))
    })?;

    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Warehouse database is not configured. Set WAREHOUSE_DB_URL or DATABASE_URL."
                .to_string(),
        )
    })?;

    let rows =
        warehouse::load_breakdown_rows(pool, Some(app), None, Some(month), Some(month)).await?;

    let receipt = build_receipt(app, month, &rows).ok_or_else(|| {
        AppError::NotFound(format!("No store payout rows for '{app}' in {month}."))
    })?;

    Ok(Json(json!(receipt)))
}
