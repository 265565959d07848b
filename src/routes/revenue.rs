use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::repository::warehouse;
use crate::schemas::{BreakdownQuery, RevenueSummaryQuery, UnifiedRevenueQuery};
use crate::services::revenue::{BreakdownRow, Platform};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/revenue/breakdown", axum::routing::get(breakdown))
        .route("/revenue/unified", axum::routing::get(unified))
        .route("/revenue/summary", axum::routing::get(summary))
}

/// Month-by-month fee/payout breakdown per (app, platform), straight from
/// the latest snapshot.
async fn breakdown(
    State(state): State<AppState>,
    Query(query): Query<BreakdownQuery>,
) -> AppResult<Json<Value>> {
    let platform = parse_platform(query.platform.as_deref())?;
    let month_from = validated_month(query.month_from.as_deref())?;
    let month_to = validated_month(query.month_to.as_deref())?;
    let app = non_empty_opt(query.app.as_deref());

    let cache_key = format!(
        "breakdown:{}:{}:{}:{}",
        app.as_deref().unwrap_or(""),
        platform.map(Platform::as_str).unwrap_or(""),
        month_from.unwrap_or(""),
        month_to.unwrap_or("")
    );
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }
    let key_lock = state.report_cache.key_lock(&cache_key).await;
    let _guard = key_lock.lock().await;
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let pool = db_pool(&state)?;
    let rows =
        warehouse::load_breakdown_rows(pool, app.as_deref(), platform, month_from, month_to)
            .await?;

    let response = json!({ "count": rows.len(), "data": rows });
    state.report_cache.put(cache_key, response.clone()).await;
    Ok(Json(response))
}

/// The long unified revenue table (Stripe + both app stores), newest
/// months first. Consumers re-sum across sources themselves.
async fn unified(
    State(state): State<AppState>,
    Query(query): Query<UnifiedRevenueQuery>,
) -> AppResult<Json<Value>> {
    let app = non_empty_opt(query.app.as_deref());

    let cache_key = format!("unified:{}", app.as_deref().unwrap_or(""));
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }
    let key_lock = state.report_cache.key_lock(&cache_key).await;
    let _guard = key_lock.lock().await;
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let pool = db_pool(&state)?;
    let rows = warehouse::load_unified_rows(pool, app.as_deref()).await?;

    let response = json!({ "count": rows.len(), "data": rows });
    state.report_cache.put(cache_key, response.clone()).await;
    Ok(Json(response))
}

/// KPI totals re-summed across platforms from the breakdown snapshot.
/// An empty selection is zero revenue, not an error.
async fn summary(
    State(state): State<AppState>,
    Query(query): Query<RevenueSummaryQuery>,
) -> AppResult<Json<Value>> {
    let month = validated_month(query.month.as_deref())?;
    let app = non_empty_opt(query.app.as_deref());

    let cache_key = format!(
        "summary:{}:{}",
        app.as_deref().unwrap_or(""),
        month.unwrap_or("")
    );
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }
    let key_lock = state.report_cache.key_lock(&cache_key).await;
    let _guard = key_lock.lock().await;
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let pool = db_pool(&state)?;
    let rows = warehouse::load_breakdown_rows(pool, app.as_deref(), None, month, month).await?;

    let mut by_platform: Vec<Value> = Vec::new();
    for platform in [Platform::Apple, Platform::Google, Platform::Stripe] {
        let subset: Vec<&BreakdownRow> =
            rows.iter().filter(|row| row.platform == platform).collect();
        if subset.is_empty() {
            continue;
        }
        by_platform.push(json!({
            "platform": platform.as_str(),
            "units": subset.iter().map(|row| row.units).sum::<i64>(),
            "sales": sum2(&subset, |row| row.sales),
            "platform_fee": sum2(&subset, |row| row.platform_fee),
            "fee_amount": sum2(&subset, |row| row.fee_amount),
            "refunds": sum2(&subset, |row| row.refund_amount),
            "payout": sum2(&subset, |row| row.payout),
        }));
    }

    let all: Vec<&BreakdownRow> = rows.iter().collect();
    let response = json!({
        "application_name": app,
        "month": month,
        "total_sales": sum2(&all, |row| row.sales),
        "total_platform_fee": sum2(&all, |row| row.platform_fee),
        "total_proceeds": sum2(&all, |row| row.proceeds),
        "total_fee_amount": sum2(&all, |row| row.fee_amount),
        "total_refunds": sum2(&all, |row| row.refund_amount),
        "total_payout": sum2(&all, |row| row.payout),
        "by_platform": by_platform,
    });
    state.report_cache.put(cache_key, response.clone()).await;
    Ok(Json(response))
}

fn sum2(rows: &[&BreakdownRow], pick: fn(&BreakdownRow) -> f64) -> f64 {
    let total: f64 = rows.iter().map(|row| pick(row)).sum();
    (total * 100.0).round() / 100.0
}

fn parse_platform(value: Option<&str>) -> AppResult<Option<Platform>> {
    match non_empty_opt(value) {
        None => Ok(None),
        Some(raw) => Platform::parse(&raw)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown platform '{raw}'."))),
    }
}

/// Validate a "YYYY-MM" month key, passing the original slice through.
fn validated_month(value: Option<&str>) -> AppResult<Option<&str>> {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid month '{raw}', expected YYYY-MM.")))?;
    Ok(Some(raw))
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Warehouse database is not configured. Set WAREHOUSE_DB_URL or DATABASE_URL."
                .to_string(),
        )
    })
}
