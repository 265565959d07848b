use std::collections::HashSet;

use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::repository::warehouse;
use crate::services::pricing::ApplePriceBook;
use crate::services::revenue::{
    aggregate_apple_monthly, aggregate_apple_refunds, aggregate_stripe_monthly, canonical_names,
    canonicalize, compute_breakdown, estimate_google_monthly, merge_breakdowns, unified_revenue,
    MonthlySales, Platform,
};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefreshSummary {
    pub apple_rows: usize,
    pub google_rows: usize,
    pub stripe_rows: usize,
    pub breakdown_rows: usize,
    pub unified_rows: usize,
}

/// Recompute both derived reporting tables from warehouse sources.
///
/// The whole snapshot is rebuilt from scratch: load the raw feeds,
/// aggregate per platform, run the fee/payout breakdown, merge, store
/// transactionally, then drop any cached report responses. Warehouse
/// access is the only thing that can fail here; the computation itself
/// has no error paths.
pub async fn refresh_revenue_snapshot(state: &AppState) -> AppResult<RefreshSummary> {
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Warehouse database is not configured. Set WAREHOUSE_DB_URL or DATABASE_URL."
                .to_string(),
        )
    })?;

    let apple_sales = warehouse::load_apple_sales(pool).await?;
    let sku_map = warehouse::load_sku_map(pool).await?;
    let fees = warehouse::load_fee_schedule(pool).await?;
    let play_events = warehouse::load_play_purchases(pool).await?;
    let stripe_invoices = warehouse::load_stripe_invoices(pool).await?;

    let price_book = ApplePriceBook::from_sales(&apple_sales);
    tracing::debug!(
        fallback_price = price_book.fallback_price(),
        "Google price proxy built from Apple history"
    );

    let mut apple_monthly = aggregate_apple_monthly(&apple_sales, &sku_map);
    let mut apple_refunds = aggregate_apple_refunds(&apple_sales, &sku_map);
    let mut google_monthly = estimate_google_monthly(&play_events, &price_book);
    let mut stripe_monthly = aggregate_stripe_monthly(&stripe_invoices);

    // Google event names sometimes differ from the Apple catalog only in
    // casing; reports key on the Apple spelling.
    let names = canonical_names(&apple_monthly);
    for row in &mut google_monthly {
        row.application_name = canonicalize(&names, &row.application_name);
    }

    let excluded: HashSet<&str> = state
        .config
        .excluded_apps
        .iter()
        .map(String::as_str)
        .collect();
    retain_included(&mut apple_monthly, &excluded);
    retain_included(&mut google_monthly, &excluded);
    retain_included(&mut stripe_monthly, &excluded);
    apple_refunds.retain(|row| !excluded.contains(row.application_name.as_str()));

    let apple = compute_breakdown(
        &apple_monthly,
        &fees,
        state.config.apple_platform_fee_pct,
        Platform::Apple,
        &apple_refunds,
    );
    let google = compute_breakdown(
        &google_monthly,
        &fees,
        state.config.google_platform_fee_pct,
        Platform::Google,
        // Play purchase events carry no refund signal; Google refunds are
        // structurally zero until a real financial feed exists.
        &[],
    );
    let stripe = compute_breakdown(
        &stripe_monthly,
        &fees,
        state.config.stripe_platform_fee_pct,
        Platform::Stripe,
        &[],
    );

    let summary = RefreshSummary {
        apple_rows: apple.len(),
        google_rows: google.len(),
        stripe_rows: stripe.len(),
        breakdown_rows: 0,
        unified_rows: 0,
    };

    let merged = merge_breakdowns(vec![apple, google, stripe]);
    let unified = unified_revenue(&merged);

    warehouse::store_revenue_snapshot(pool, &merged, &unified).await?;
    state.report_cache.clear().await;

    let summary = RefreshSummary {
        breakdown_rows: merged.len(),
        unified_rows: unified.len(),
        ..summary
    };
    tracing::info!(
        apple = summary.apple_rows,
        google = summary.google_rows,
        stripe = summary.stripe_rows,
        breakdown = summary.breakdown_rows,
        unified = summary.unified_rows,
        "Revenue snapshot refreshed"
    );
    Ok(summary)
}

fn retain_included(rows: &mut Vec<MonthlySales>, excluded: &HashSet<&str>) {
    rows.retain(|row| !excluded.contains(row.application_name.as_str()));
}
