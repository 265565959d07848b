use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::services::revenue::{round2, BreakdownRow, Platform};

/// One platform line on a payout receipt, re-derived from the breakdown
/// table for a single (app, month) selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptLine {
    pub platform: Platform,
    pub units: i64,
    pub unit_price: f64,
    pub sales: f64,
    pub platform_fee_pct: f64,
    pub platform_fee: f64,
    pub fee_amount: f64,
    pub refund_amount: f64,
    pub payout: f64,
}

/// Everything the receipt renderer needs for one app-month payout.
/// Rendering (PDF) is a downstream concern; this is the data contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptData {
    pub application_name: String,
    pub month: String,
    pub invoice_number: String,
    pub payment_date: String,
    pub fee_pct: f64,
    pub lines: Vec<ReceiptLine>,
    pub total_sales: f64,
    pub total_platform_fee: f64,
    pub total_fee_amount: f64,
    pub total_refunds: f64,
    pub total_payout: f64,
}

/// Deterministic invoice number for an (app, month) pair: the month code
/// followed by six hex characters of a digest over "{app}_{month}".
/// Stable across refreshes so re-downloaded receipts keep their number.
pub fn invoice_number(application_name: &str, month: &str) -> String {
    let seed = format!("{application_name}_{month}");
    let digest = Sha256::digest(seed.as_bytes());
    let hex: String = digest
        .iter()
        .take(3)
        .map(|byte| format!("{byte:02X}"))
        .collect();
    let month_code = month.replace('-', "");
    format!("{month_code}{hex}")
}

/// Mobile-store payout lines for one (app, month). Stripe payouts are
/// settled by the processor directly and never appear on IAP receipts.
/// Returns `None` when the selection has no store rows at all.
pub fn build_receipt(
    application_name: &str,
    month: &str,
    rows: &[BreakdownRow],
) -> Option<ReceiptData> {
    let mut lines: Vec<ReceiptLine> = rows
        .iter()
        .filter(|row| {
            row.application_name == application_name
                && row.month == month
                && row.platform != Platform::Stripe
        })
        .map(|row| ReceiptLine {
            platform: row.platform,
            units: row.units,
            unit_price: if row.units > 0 {
                round2(row.sales / row.units as f64)
            } else {
                0.0
            },
            sales: row.sales,
            platform_fee_pct: row.platform_fee_pct,
            platform_fee: row.platform_fee,
            fee_amount: row.fee_amount,
            refund_amount: row.refund_amount,
            payout: row.payout,
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    lines.sort_by_key(|line| line.platform.as_str());

    let fee_pct = rows
        .iter()
        .find(|row| {
            row.application_name == application_name && row.month == month && row.fee_pct > 0.0
        })
        .map(|row| row.fee_pct)
        .unwrap_or(0.0);

    let total = |pick: fn(&ReceiptLine) -> f64| round2(lines.iter().map(pick).sum());

    Some(ReceiptData {
        application_name: application_name.to_string(),
        month: month.to_string(),
        invoice_number: invoice_number(application_name, month),
        payment_date: format!("10th of month following {month}"),
        fee_pct,
        lines: lines.clone(),
        total_sales: total(|line| line.sales),
        total_platform_fee: total(|line| line.platform_fee),
        total_fee_amount: total(|line| line.fee_amount),
        total_refunds: total(|line| line.refund_amount),
        total_payout: total(|line| line.payout),
    })
}

#[cfg(test)]
mod tests {
    use super::{build_receipt, invoice_number};
    use crate::services::revenue::{BreakdownRow, Platform};

    fn row(platform: Platform, units: i64, sales: f64, payout: f64) -> BreakdownRow {
        BreakdownRow {
            application_name: "Peak Performance".to_string(),
            month: "2026-01".to_string(),
            platform,
            units,
            sales,
            platform_fee_pct: 30.0,
            platform_fee: (sales * 0.3 * 100.0).round() / 100.0,
            proceeds: (sales * 0.7 * 100.0).round() / 100.0,
            fee_pct: 10.0,
            fee_amount: (sales * 0.1 * 100.0).round() / 100.0,
            refund_amount: 0.0,
            payout,
        }
    }

    #[test]
    fn invoice_numbers_are_deterministic_and_formatted() {
        let first = invoice_number("Peak Performance", "2026-01");
        let second = invoice_number("Peak Performance", "2026-01");
        assert_eq!(first, second);
        assert!(first.starts_with("202601"));
        assert_eq!(first.len(), 12);
        assert_ne!(first, invoice_number("Peak Performance", "2026-02"));
        assert_ne!(first, invoice_number("Other App", "2026-01"));
    }

    #[test]
    fn derives_per_platform_unit_prices_and_totals() {
        let rows = vec![
            row(Platform::Apple, 10, 99.9, 59.94),
            row(Platform::Google, 5, 49.95, 29.97),
            row(Platform::Stripe, 2, 200.0, 180.0),
        ];
        let receipt = build_receipt("Peak Performance", "2026-01", &rows).unwrap();

        // Stripe never appears on an IAP receipt.
        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(receipt.lines[0].platform, Platform::Apple);
        assert_eq!(receipt.lines[0].unit_price, 9.99);
        assert_eq!(receipt.lines[1].unit_price, 9.99);
        assert_eq!(receipt.fee_pct, 10.0);
        assert_eq!(receipt.total_sales, 149.85);
        assert_eq!(receipt.total_payout, 89.91);
        assert_eq!(receipt.payment_date, "10th of month following 2026-01");
    }

    #[test]
    fn zero_units_do_not_divide() {
        let rows = vec![row(Platform::Apple, 0, 0.0, 0.0)];
        let receipt = build_receipt("Peak Performance", "2026-01", &rows).unwrap();
        assert_eq!(receipt.lines[0].unit_price, 0.0);
    }

    #[test]
    fn missing_selection_yields_none() {
        let rows = vec![row(Platform::Apple, 1, 9.99, 5.99)];
        assert!(build_receipt("Peak Performance", "2025-12", &rows).is_none());
        assert!(build_receipt("Nobody", "2026-01", &rows).is_none());
    }
}
