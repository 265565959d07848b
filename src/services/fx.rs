/// Approximate USD exchange rates for storefront currencies, hand-maintained.
///
/// These are deliberately static: revenue reports must be reproducible
/// across runs, so rates only change with a deploy. A currency that the
/// platform starts reporting before it lands here falls back to 1.0
/// (treated as already-USD) rather than failing the aggregation —
/// historical totals stay computable either way.
const USD_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("GBP", 1.27),
    ("EUR", 1.08),
    ("AUD", 0.64),
    ("CAD", 0.72),
    ("CHF", 1.13),
    ("DKK", 0.145),
    ("NOK", 0.093),
    ("SEK", 0.095),
    ("NZD", 0.60),
    ("SGD", 0.75),
    ("HUF", 0.0027),
    ("CLP", 0.00105),
    ("COP", 0.00024),
    ("CZK", 0.042),
    ("PLN", 0.25),
    ("BRL", 0.19),
    ("MXN", 0.055),
    ("TRY", 0.031),
    ("RUB", 0.011),
    ("ILS", 0.28),
    ("SAR", 0.267),
    ("AED", 0.272),
    ("INR", 0.012),
    ("ZAR", 0.054),
    ("RON", 0.22),
];

/// USD multiplier for a currency code. Unknown codes map to 1.0.
pub fn usd_rate(currency: &str) -> f64 {
    let code = currency.trim();
    USD_RATES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(code))
        .map(|(_, rate)| *rate)
        .unwrap_or(1.0)
}

/// Convert an amount in the given currency to USD.
pub fn to_usd(amount: f64, currency: &str) -> f64 {
    amount * usd_rate(currency)
}

#[cfg(test)]
mod tests {
    use super::{to_usd, usd_rate};

    #[test]
    fn usd_is_identity() {
        assert_eq!(usd_rate("USD"), 1.0);
        assert_eq!(to_usd(12.5, "USD"), 12.5);
    }

    #[test]
    fn known_rates_apply() {
        assert_eq!(usd_rate("GBP"), 1.27);
        assert_eq!(usd_rate("gbp"), 1.27);
        assert!((to_usd(100.0, "EUR") - 108.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_currency_falls_back_to_usd() {
        // Unlisted currencies must be treated as already-USD, never dropped
        // and never an error.
        assert_eq!(usd_rate("XYZ"), 1.0);
        assert_eq!(usd_rate(""), 1.0);
        assert_eq!(to_usd(9.99, "KRW"), 9.99);
    }
}
