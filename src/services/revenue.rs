use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::services::fees::FeeSchedule;
use crate::services::fx::to_usd;
use crate::services::pricing::PriceEstimator;

/// Sales whose SKU has no entry in the product map are aggregated here,
/// never dropped.
pub const UNKNOWN_APP: &str = "Unknown";

/// Google Play reports no per-event proceeds, so the 30% store cut is a
/// hard-coded assumption: proceeds = estimated gross × 0.70.
const GOOGLE_PROCEEDS_RATE: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Apple,
    Google,
    Stripe,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Apple => "Apple",
            Platform::Google => "Google",
            Platform::Stripe => "Stripe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "apple" => Some(Platform::Apple),
            "google" => Some(Platform::Google),
            "stripe" => Some(Platform::Stripe),
            _ => None,
        }
    }

    /// Source label used by the unified revenue table.
    pub fn revenue_source(self) -> &'static str {
        match self {
            Platform::Apple => "iOS App Store",
            Platform::Google => "Google Play Store",
            Platform::Stripe => "Stripe",
        }
    }
}

/// One raw Apple daily sales row, restricted upstream to in-app-purchase
/// product types. Prices are in the transaction currency.
#[derive(Debug, Clone, PartialEq)]
pub struct AppleSaleRecord {
    pub sku: String,
    pub report_date: NaiveDate,
    pub units: i64,
    pub customer_price: f64,
    pub developer_proceeds: f64,
    pub currency: String,
}

/// One Google Play purchase-completed event. Carries no amount.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayPurchaseEvent {
    pub application_name: String,
    pub event_date: NaiveDate,
    pub product_id: String,
}

/// One paid subscription invoice from the payment processor.
/// Amounts are integer cents in the invoice currency.
#[derive(Debug, Clone, PartialEq)]
pub struct StripeInvoiceRecord {
    pub application_name: String,
    pub paid_at: NaiveDate,
    pub amount_cents: i64,
    pub currency: String,
}

/// Per-(app, month) platform aggregate: gross sales and proceeds in USD.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    pub application_name: String,
    pub month: String,
    pub units: i64,
    pub sales: f64,
    pub proceeds: f64,
}

/// Per-(app, month) refund totals. Amounts are non-negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRefunds {
    pub application_name: String,
    pub month: String,
    pub refund_units: i64,
    pub refund_amount: f64,
}

/// The central derived row: one (app, month, platform) with the full fee
/// and payout breakdown. Recomputed from scratch on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub application_name: String,
    pub month: String,
    pub platform: Platform,
    pub units: i64,
    pub sales: f64,
    pub platform_fee_pct: f64,
    pub platform_fee: f64,
    pub proceeds: f64,
    pub fee_pct: f64,
    pub fee_amount: f64,
    pub refund_amount: f64,
    pub payout: f64,
}

/// One row of the long unified revenue table consumed by GMV dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedRevenueRow {
    pub application_name: String,
    pub month: String,
    pub month_label: String,
    pub month_sort: i64,
    pub revenue: f64,
    pub revenue_source: String,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calendar month key, e.g. "2026-01".
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Human month label for a month key, e.g. "Jan 2026".
pub fn month_label(month: &str) -> String {
    NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .map(|date| date.format("%b %Y").to_string())
        .unwrap_or_else(|_| month.to_string())
}

/// Numeric sort key for a month key, e.g. 202601.
pub fn month_sort(month: &str) -> i64 {
    NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .map(|date| date.year() as i64 * 100 + date.month() as i64)
        .unwrap_or(0)
}

/// Aggregate raw Apple sales to (app, month) totals in USD.
///
/// Per-row: convert customer price and developer proceeds with the static
/// FX table, resolve the SKU to an app name ("Unknown" when unmapped),
/// drop rows whose converted unit price is non-positive (free/promo
/// noise), then sum unit-weighted amounts per calendar month, rounded to
/// 2 decimals. Refund rows (negative units) are excluded here entirely:
/// refunds are subtracted once in the payout step, never netted against
/// gross sales.
pub fn aggregate_apple_monthly(
    sales: &[AppleSaleRecord],
    sku_map: &HashMap<String, String>,
) -> Vec<MonthlySales> {
    let mut grouped: BTreeMap<(String, String), (i64, f64, f64)> = BTreeMap::new();

    for sale in sales {
        if sale.units < 0 {
            continue;
        }
        let price_usd = to_usd(sale.customer_price, &sale.currency);
        if price_usd <= 0.0 {
            continue;
        }
        let proceeds_usd = to_usd(sale.developer_proceeds, &sale.currency);
        let app = sku_map
            .get(&sale.sku)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_APP.to_string());

        let entry = grouped
            .entry((app, month_key(sale.report_date)))
            .or_insert((0, 0.0, 0.0));
        entry.0 += sale.units;
        entry.1 += price_usd * sale.units as f64;
        entry.2 += proceeds_usd * sale.units as f64;
    }

    grouped
        .into_iter()
        .map(
            |((application_name, month), (units, sales, proceeds))| MonthlySales {
                application_name,
                month,
                units,
                sales: round2(sales),
                proceeds: round2(proceeds),
            },
        )
        .collect()
}

/// Aggregate Apple refund rows (negative units) to (app, month) totals.
/// Amounts come out non-negative; they are subtracted in the payout step,
/// never netted against sales upstream.
pub fn aggregate_apple_refunds(
    sales: &[AppleSaleRecord],
    sku_map: &HashMap<String, String>,
) -> Vec<MonthlyRefunds> {
    let mut grouped: BTreeMap<(String, String), (i64, f64)> = BTreeMap::new();

    for sale in sales {
        if sale.units >= 0 {
            continue;
        }
        let price_usd = to_usd(sale.customer_price, &sale.currency);
        let app = sku_map
            .get(&sale.sku)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_APP.to_string());

        let entry = grouped
            .entry((app, month_key(sale.report_date)))
            .or_insert((0, 0.0));
        entry.0 += sale.units;
        entry.1 += price_usd * sale.units as f64;
    }

    grouped
        .into_iter()
        .map(
            |((application_name, month), (units, amount))| MonthlyRefunds {
                application_name,
                month,
                refund_units: units.abs(),
                refund_amount: round2(amount.abs()),
            },
        )
        .collect()
}

/// Estimate Google Play monthly revenue from purchase events.
///
/// Each event is priced through the estimator (matching Apple SKU
/// average, platform-wide fallback otherwise); gross sales are the sum
/// of estimated prices and proceeds assume the 30% store commission.
pub fn estimate_google_monthly(
    events: &[PlayPurchaseEvent],
    pricer: &dyn PriceEstimator,
) -> Vec<MonthlySales> {
    let mut grouped: BTreeMap<(String, String), (i64, f64)> = BTreeMap::new();

    for event in events {
        if event.application_name.trim().is_empty() {
            continue;
        }
        let entry = grouped
            .entry((
                event.application_name.clone(),
                month_key(event.event_date),
            ))
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += pricer.price_for(&event.product_id);
    }

    grouped
        .into_iter()
        .map(|((application_name, month), (units, total))| MonthlySales {
            application_name,
            month,
            units,
            sales: round2(total),
            proceeds: round2(total * GOOGLE_PROCEEDS_RATE),
        })
        .collect()
}

/// Aggregate paid processor invoices to (app, month) totals in USD.
/// No store commission applies; proceeds equal gross sales here and the
/// breakdown step applies a 0% platform fee.
pub fn aggregate_stripe_monthly(invoices: &[StripeInvoiceRecord]) -> Vec<MonthlySales> {
    let mut grouped: BTreeMap<(String, String), (i64, f64)> = BTreeMap::new();

    for invoice in invoices {
        if invoice.application_name.trim().is_empty() {
            continue;
        }
        let amount_usd = to_usd(invoice.amount_cents as f64 / 100.0, &invoice.currency);
        let entry = grouped
            .entry((
                invoice.application_name.clone(),
                month_key(invoice.paid_at),
            ))
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += amount_usd;
    }

    grouped
        .into_iter()
        .map(|((application_name, month), (units, total))| MonthlySales {
            application_name,
            month,
            units,
            sales: round2(total),
            proceeds: round2(total),
        })
        .collect()
}

/// Compute the full fee/payout breakdown for one platform's monthly
/// aggregates. The order of operations is load-bearing:
///
/// 1. platform_fee = round2(sales × platform_fee_pct / 100)
/// 2. proceeds     = round2(sales − platform_fee)
/// 3. fee_amount   = round2(sales × fee_pct / 100)   — on GROSS sales
/// 4. payout       = round2(sales − platform_fee − fee_amount − refunds)
///
/// Nothing here can fail: missing fee config resolves to 0%, missing
/// refunds to 0.00, and an empty input produces an empty output.
pub fn compute_breakdown(
    monthly: &[MonthlySales],
    fees: &FeeSchedule,
    platform_fee_pct: f64,
    platform: Platform,
    refunds: &[MonthlyRefunds],
) -> Vec<BreakdownRow> {
    let refund_index: HashMap<(&str, &str), f64> = refunds
        .iter()
        .map(|r| {
            (
                (r.application_name.as_str(), r.month.as_str()),
                r.refund_amount,
            )
        })
        .collect();

    monthly
        .iter()
        .map(|row| {
            let platform_fee = round2(row.sales * platform_fee_pct / 100.0);
            let proceeds = round2(row.sales - platform_fee);
            let fee_pct = fees.fee_pct_for(&row.application_name);
            let fee_amount = round2(row.sales * fee_pct / 100.0);
            let refund_amount = refund_index
                .get(&(row.application_name.as_str(), row.month.as_str()))
                .copied()
                .unwrap_or(0.0);
            let payout = round2(row.sales - platform_fee - fee_amount - refund_amount);

            BreakdownRow {
                application_name: row.application_name.clone(),
                month: row.month.clone(),
                platform,
                units: row.units,
                sales: row.sales,
                platform_fee_pct,
                platform_fee,
                proceeds,
                fee_pct,
                fee_amount,
                refund_amount,
                payout,
            }
        })
        .collect()
}

/// Concatenate per-platform breakdown tables into one long table.
/// Each source is already uniquely keyed by its platform tag, so there
/// is nothing to deduplicate; the only contract is that no row is lost
/// or double-counted. Downstream consumers re-sum across platforms.
pub fn merge_breakdowns(parts: Vec<Vec<BreakdownRow>>) -> Vec<BreakdownRow> {
    parts.into_iter().flatten().collect()
}

/// Build the unified revenue table from merged breakdown rows.
/// Stripe contributes gross GMV; the mobile stores contribute proceeds
/// (what actually reaches the platform after the store commission).
/// Ordered by month descending, then app name.
pub fn unified_revenue(rows: &[BreakdownRow]) -> Vec<UnifiedRevenueRow> {
    let mut unified: Vec<UnifiedRevenueRow> = rows
        .iter()
        .map(|row| UnifiedRevenueRow {
            application_name: row.application_name.clone(),
            month: row.month.clone(),
            month_label: month_label(&row.month),
            month_sort: month_sort(&row.month),
            revenue: match row.platform {
                Platform::Stripe => row.sales,
                Platform::Apple | Platform::Google => row.proceeds,
            },
            revenue_source: row.platform.revenue_source().to_string(),
        })
        .collect();

    unified.sort_by(|left, right| {
        right
            .month_sort
            .cmp(&left.month_sort)
            .then_with(|| left.application_name.cmp(&right.application_name))
    });
    unified
}

/// Case-insensitive canonical app-name map built from the Apple
/// aggregates. Google event names sometimes differ from the Apple
/// catalog only in casing; reports key on the Apple spelling.
pub fn canonical_names(apple: &[MonthlySales]) -> HashMap<String, String> {
    apple
        .iter()
        .map(|row| {
            (
                row.application_name.to_lowercase(),
                row.application_name.clone(),
            )
        })
        .collect()
}

pub fn canonicalize(names: &HashMap<String, String>, name: &str) -> String {
    names
        .get(&name.to_lowercase())
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pricing::ApplePriceBook;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn apple_sale(
        sku: &str,
        day: NaiveDate,
        units: i64,
        price: f64,
        currency: &str,
    ) -> AppleSaleRecord {
        AppleSaleRecord {
            sku: sku.to_string(),
            report_date: day,
            units,
            customer_price: price,
            developer_proceeds: price * 0.7,
            currency: currency.to_string(),
        }
    }

    fn sku_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(sku, app)| (sku.to_string(), app.to_string()))
            .collect()
    }

    #[test]
    fn apple_aggregation_groups_by_app_and_month() {
        let sales = vec![
            apple_sale("pp.monthly", date(2026, 1, 3), 2, 9.99, "USD"),
            apple_sale("pp.monthly", date(2026, 1, 20), 1, 9.99, "USD"),
            apple_sale("pp.monthly", date(2026, 2, 1), 1, 9.99, "USD"),
        ];
        let map = sku_map(&[("pp.monthly", "Peak Performance")]);

        let monthly = aggregate_apple_monthly(&sales, &map);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].application_name, "Peak Performance");
        assert_eq!(monthly[0].month, "2026-01");
        assert_eq!(monthly[0].units, 3);
        assert_eq!(monthly[0].sales, 29.97);
        assert_eq!(monthly[1].month, "2026-02");
        assert_eq!(monthly[1].sales, 9.99);
    }

    #[test]
    fn unmapped_sku_lands_under_unknown() {
        let sales = vec![apple_sale("ghost.sku", date(2026, 3, 5), 1, 4.99, "USD")];
        let monthly = aggregate_apple_monthly(&sales, &HashMap::new());
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].application_name, UNKNOWN_APP);
        assert_eq!(monthly[0].sales, 4.99);
    }

    #[test]
    fn unlisted_currency_is_treated_as_usd() {
        let sales = vec![apple_sale("pp.monthly", date(2026, 1, 3), 1, 9.99, "XXX")];
        let map = sku_map(&[("pp.monthly", "Peak Performance")]);
        let monthly = aggregate_apple_monthly(&sales, &map);
        assert_eq!(monthly[0].sales, 9.99);
    }

    #[test]
    fn non_positive_prices_are_dropped() {
        let sales = vec![
            apple_sale("pp.monthly", date(2026, 1, 3), 5, 0.0, "USD"),
            apple_sale("pp.monthly", date(2026, 1, 4), 1, 9.99, "USD"),
        ];
        let map = sku_map(&[("pp.monthly", "Peak Performance")]);
        let monthly = aggregate_apple_monthly(&sales, &map);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].units, 1);
    }

    #[test]
    fn refunds_aggregate_to_positive_amounts() {
        let sales = vec![
            apple_sale("pp.monthly", date(2026, 1, 3), 3, 9.99, "USD"),
            apple_sale("pp.monthly", date(2026, 1, 9), -2, 9.99, "USD"),
        ];
        let map = sku_map(&[("pp.monthly", "Peak Performance")]);
        let refunds = aggregate_apple_refunds(&sales, &map);
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].refund_units, 2);
        assert_eq!(refunds[0].refund_amount, 19.98);
    }

    #[test]
    fn refund_rows_never_net_against_gross_sales() {
        let sales = vec![
            apple_sale("pp.monthly", date(2026, 1, 3), 3, 9.99, "USD"),
            apple_sale("pp.monthly", date(2026, 1, 9), -2, 9.99, "USD"),
        ];
        let map = sku_map(&[("pp.monthly", "Peak Performance")]);
        let monthly = aggregate_apple_monthly(&sales, &map);
        assert_eq!(monthly[0].units, 3);
        assert_eq!(monthly[0].sales, 29.97);
    }

    #[test]
    fn google_estimator_prices_events_from_apple_history() {
        // SKU with Apple average $9.99 and 5 Google purchases of that SKU:
        // sales = 49.95, proceeds = 34.97.
        let apple = vec![apple_sale("pp.monthly", date(2026, 1, 2), 1, 9.99, "USD")];
        let book = ApplePriceBook::from_sales(&apple);

        let events: Vec<PlayPurchaseEvent> = (1..=5)
            .map(|day| PlayPurchaseEvent {
                application_name: "Peak Performance".to_string(),
                event_date: date(2026, 2, day),
                product_id: "pp.monthly".to_string(),
            })
            .collect();

        let monthly = estimate_google_monthly(&events, &book);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].units, 5);
        assert_eq!(monthly[0].sales, 49.95);
        assert_eq!(monthly[0].proceeds, 34.97);
    }

    #[test]
    fn google_estimator_falls_back_to_platform_average() {
        let apple = vec![
            apple_sale("a", date(2026, 1, 2), 1, 4.0, "USD"),
            apple_sale("b", date(2026, 1, 2), 1, 6.0, "USD"),
        ];
        let book = ApplePriceBook::from_sales(&apple);
        let events = vec![PlayPurchaseEvent {
            application_name: "Niche App".to_string(),
            event_date: date(2026, 2, 1),
            product_id: "never.on.ios".to_string(),
        }];
        let monthly = estimate_google_monthly(&events, &book);
        assert_eq!(monthly[0].sales, 5.0);
    }

    #[test]
    fn stripe_invoices_aggregate_in_usd() {
        let invoices = vec![
            StripeInvoiceRecord {
                application_name: "Peak Performance".to_string(),
                paid_at: date(2026, 1, 5),
                amount_cents: 10000,
                currency: "usd".to_string(),
            },
            StripeInvoiceRecord {
                application_name: "Peak Performance".to_string(),
                paid_at: date(2026, 1, 25),
                amount_cents: 10000,
                currency: "gbp".to_string(),
            },
        ];
        let monthly = aggregate_stripe_monthly(&invoices);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].units, 2);
        assert_eq!(monthly[0].sales, 227.0);
    }

    #[test]
    fn breakdown_matches_worked_example() {
        // sales=1000.00, platform 30%, operator 10% →
        // platform_fee=300.00, proceeds=700.00, fee=100.00, payout=600.00
        let monthly = vec![MonthlySales {
            application_name: "Peak Performance".to_string(),
            month: "2026-01".to_string(),
            units: 100,
            sales: 1000.0,
            proceeds: 700.0,
        }];
        let fees = FeeSchedule::new([("Peak Performance".to_string(), 10.0)]);

        let rows = compute_breakdown(&monthly, &fees, 30.0, Platform::Apple, &[]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.platform_fee, 300.0);
        assert_eq!(row.proceeds, 700.0);
        assert_eq!(row.fee_pct, 10.0);
        assert_eq!(row.fee_amount, 100.0);
        assert_eq!(row.payout, 600.0);
    }

    #[test]
    fn breakdown_invariants_hold_for_every_row() {
        let monthly = vec![
            MonthlySales {
                application_name: "A".to_string(),
                month: "2026-01".to_string(),
                units: 7,
                sales: 123.45,
                proceeds: 86.42,
            },
            MonthlySales {
                application_name: "B".to_string(),
                month: "2026-02".to_string(),
                units: 3,
                sales: 0.01,
                proceeds: 0.01,
            },
        ];
        let fees = FeeSchedule::new([("A".to_string(), 12.5)]);
        let refunds = vec![MonthlyRefunds {
            application_name: "A".to_string(),
            month: "2026-01".to_string(),
            refund_units: 1,
            refund_amount: 9.99,
        }];

        for row in compute_breakdown(&monthly, &fees, 30.0, Platform::Google, &refunds) {
            assert_eq!(row.platform_fee, round2(row.sales * row.platform_fee_pct / 100.0));
            assert_eq!(row.proceeds, round2(row.sales - row.platform_fee));
            assert_eq!(row.fee_amount, round2(row.sales * row.fee_pct / 100.0));
            assert_eq!(
                row.payout,
                round2(row.sales - row.platform_fee - row.fee_amount - row.refund_amount)
            );
        }
    }

    #[test]
    fn zero_sales_produce_zero_derived_fields() {
        let monthly = vec![MonthlySales {
            application_name: "Quiet App".to_string(),
            month: "2026-01".to_string(),
            units: 0,
            sales: 0.0,
            proceeds: 0.0,
        }];
        let fees = FeeSchedule::new([("Quiet App".to_string(), 10.0)]);
        let row = &compute_breakdown(&monthly, &fees, 30.0, Platform::Apple, &[])[0];
        assert_eq!(row.platform_fee, 0.0);
        assert_eq!(row.proceeds, 0.0);
        assert_eq!(row.fee_amount, 0.0);
        assert_eq!(row.payout, 0.0);
        assert!(row.payout.is_finite());
    }

    #[test]
    fn missing_fee_config_defaults_to_zero_pct() {
        let monthly = vec![MonthlySales {
            application_name: "Unlisted".to_string(),
            month: "2026-01".to_string(),
            units: 1,
            sales: 50.0,
            proceeds: 35.0,
        }];
        let row = &compute_breakdown(&monthly, &FeeSchedule::default(), 30.0, Platform::Apple, &[])[0];
        assert_eq!(row.fee_pct, 0.0);
        assert_eq!(row.fee_amount, 0.0);
        assert_eq!(row.payout, 35.0);
    }

    #[test]
    fn refunds_are_subtracted_from_payout() {
        let monthly = vec![MonthlySales {
            application_name: "A".to_string(),
            month: "2026-01".to_string(),
            units: 10,
            sales: 100.0,
            proceeds: 70.0,
        }];
        let refunds = vec![MonthlyRefunds {
            application_name: "A".to_string(),
            month: "2026-01".to_string(),
            refund_units: 1,
            refund_amount: 10.0,
        }];
        let row = &compute_breakdown(&monthly, &FeeSchedule::default(), 30.0, Platform::Apple, &refunds)[0];
        assert_eq!(row.refund_amount, 10.0);
        assert_eq!(row.payout, 60.0);
    }

    #[test]
    fn merge_never_loses_or_double_counts_rows() {
        let monthly = vec![MonthlySales {
            application_name: "A".to_string(),
            month: "2026-01".to_string(),
            units: 1,
            sales: 10.0,
            proceeds: 7.0,
        }];
        let fees = FeeSchedule::default();
        let apple = compute_breakdown(&monthly, &fees, 30.0, Platform::Apple, &[]);
        let google = compute_breakdown(&monthly, &fees, 30.0, Platform::Google, &[]);
        let merged = merge_breakdowns(vec![apple.clone(), google.clone()]);
        assert_eq!(merged.len(), apple.len() + google.len());
        assert_eq!(merged[0].platform, Platform::Apple);
        assert_eq!(merged[1].platform, Platform::Google);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let sales = vec![
            apple_sale("pp.monthly", date(2026, 1, 3), 2, 9.99, "GBP"),
            apple_sale("other.sku", date(2026, 1, 9), 1, 14.99, "EUR"),
        ];
        let map = sku_map(&[("pp.monthly", "Peak Performance")]);
        let fees = FeeSchedule::new([("Peak Performance".to_string(), 10.0)]);

        let run = || {
            let monthly = aggregate_apple_monthly(&sales, &map);
            compute_breakdown(&monthly, &fees, 30.0, Platform::Apple, &[])
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn google_names_canonicalize_to_apple_spelling() {
        let apple = vec![MonthlySales {
            application_name: "Peak Performance".to_string(),
            month: "2026-01".to_string(),
            units: 1,
            sales: 9.99,
            proceeds: 6.99,
        }];
        let names = canonical_names(&apple);
        assert_eq!(canonicalize(&names, "peak performance"), "Peak Performance");
        assert_eq!(canonicalize(&names, "PEAK PERFORMANCE"), "Peak Performance");
        assert_eq!(canonicalize(&names, "Different App"), "Different App");
    }

    #[test]
    fn unified_revenue_orders_and_labels_months() {
        let fees = FeeSchedule::default();
        let monthly = |month: &str, sales: f64| MonthlySales {
            application_name: "A".to_string(),
            month: month.to_string(),
            units: 1,
            sales,
            proceeds: round2(sales * 0.7),
        };
        let apple = compute_breakdown(&[monthly("2025-12", 10.0)], &fees, 30.0, Platform::Apple, &[]);
        let stripe = compute_breakdown(&[monthly("2026-01", 20.0)], &fees, 0.0, Platform::Stripe, &[]);

        let unified = unified_revenue(&merge_breakdowns(vec![apple, stripe]));
        assert_eq!(unified.len(), 2);
        assert_eq!(unified[0].month, "2026-01");
        assert_eq!(unified[0].month_label, "Jan 2026");
        assert_eq!(unified[0].month_sort, 202601);
        assert_eq!(unified[0].revenue, 20.0);
        assert_eq!(unified[1].revenue_source, "iOS App Store");
        assert_eq!(unified[1].revenue, 7.0);
    }
}
