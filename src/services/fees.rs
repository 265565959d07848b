use std::collections::HashMap;

/// Per-app KLIQ commission percentages, loaded from the fee lookup table.
///
/// Absence is a valid business state: new apps pay 0% until configured,
/// so the lookup never errors. Percentages are expressed 0-100.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    rates: HashMap<String, f64>,
}

impl FeeSchedule {
    pub fn new(rows: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            rates: rows.into_iter().collect(),
        }
    }

    /// KLIQ fee percentage for an app, defaulting to 0 when unconfigured.
    pub fn fee_pct_for(&self, application_name: &str) -> f64 {
        self.rates.get(application_name).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::FeeSchedule;

    #[test]
    fn looks_up_configured_apps() {
        let fees = FeeSchedule::new([("Peak Performance".to_string(), 10.0)]);
        assert_eq!(fees.fee_pct_for("Peak Performance"), 10.0);
    }

    #[test]
    fn missing_app_defaults_to_zero() {
        let fees = FeeSchedule::new([]);
        assert_eq!(fees.fee_pct_for("Brand New App"), 0.0);
    }
}
