use std::collections::HashMap;

use crate::services::fx::to_usd;
use crate::services::revenue::AppleSaleRecord;

/// Prices a storefront SKU in USD.
///
/// Google Play purchase events carry no transaction amount, so Google
/// revenue is estimated through this seam. The production implementation
/// proxies Apple's observed prices; a real Play financial feed can
/// replace it without touching the aggregation.
pub trait PriceEstimator {
    fn price_for(&self, sku: &str) -> f64;
}

/// Average Apple App Store unit price per SKU, with a platform-wide
/// fallback for SKUs that have no Apple-side pricing history.
///
/// Averages are taken over positive-priced transactions only. An app with
/// zero Apple history anywhere degrades to the platform-wide average,
/// which can be systematically wrong for low-price apps — a known
/// approximation that must stay observable, not be corrected silently.
#[derive(Debug, Clone)]
pub struct ApplePriceBook {
    per_sku: HashMap<String, f64>,
    fallback: f64,
}

impl ApplePriceBook {
    pub fn from_sales(sales: &[AppleSaleRecord]) -> Self {
        let mut sums: HashMap<String, (f64, u64)> = HashMap::new();
        let mut overall_sum = 0.0;
        let mut overall_count = 0u64;

        for sale in sales {
            let price_usd = to_usd(sale.customer_price, &sale.currency);
            if price_usd <= 0.0 {
                continue;
            }
            let entry = sums.entry(sale.sku.clone()).or_insert((0.0, 0));
            entry.0 += price_usd;
            entry.1 += 1;
            overall_sum += price_usd;
            overall_count += 1;
        }

        let per_sku = sums
            .into_iter()
            .map(|(sku, (sum, count))| (sku, round2(sum / count as f64)))
            .collect();
        let fallback = if overall_count > 0 {
            round2(overall_sum / overall_count as f64)
        } else {
            // No Apple history at all: estimates degrade to zero rather
            // than erroring, consistent with the rest of the pipeline.
            0.0
        };

        Self { per_sku, fallback }
    }

    pub fn fallback_price(&self) -> f64 {
        self.fallback
    }
}

impl PriceEstimator for ApplePriceBook {
    fn price_for(&self, sku: &str) -> f64 {
        self.per_sku.get(sku).copied().unwrap_or(self.fallback)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{ApplePriceBook, PriceEstimator};
    use crate::services::revenue::AppleSaleRecord;
    use chrono::NaiveDate;

    fn sale(sku: &str, price: f64, currency: &str) -> AppleSaleRecord {
        AppleSaleRecord {
            sku: sku.to_string(),
            report_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            units: 1,
            customer_price: price,
            developer_proceeds: price * 0.7,
            currency: currency.to_string(),
        }
    }

    #[test]
    fn averages_per_sku_in_usd() {
        let book = ApplePriceBook::from_sales(&[
            sale("coach.monthly", 9.99, "USD"),
            sale("coach.monthly", 10.01, "USD"),
            sale("coach.annual", 100.0, "GBP"),
        ]);
        assert_eq!(book.price_for("coach.monthly"), 10.0);
        assert_eq!(book.price_for("coach.annual"), 127.0);
    }

    #[test]
    fn unknown_sku_uses_platform_fallback() {
        let book = ApplePriceBook::from_sales(&[
            sale("a", 4.0, "USD"),
            sale("b", 6.0, "USD"),
        ]);
        assert_eq!(book.fallback_price(), 5.0);
        assert_eq!(book.price_for("never.seen"), 5.0);
    }

    #[test]
    fn ignores_non_positive_prices() {
        let book = ApplePriceBook::from_sales(&[
            sale("a", 0.0, "USD"),
            sale("a", -9.99, "USD"),
            sale("a", 9.99, "USD"),
        ]);
        assert_eq!(book.price_for("a"), 9.99);
    }

    #[test]
    fn no_history_degrades_to_zero() {
        let book = ApplePriceBook::from_sales(&[]);
        assert_eq!(book.fallback_price(), 0.0);
        assert_eq!(book.price_for("anything"), 0.0);
    }
}
