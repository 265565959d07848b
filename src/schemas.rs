use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakdownQuery {
    pub app: Option<String>,
    pub platform: Option<String>,
    pub month_from: Option<String>,
    pub month_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnifiedRevenueQuery {
    pub app: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueSummaryQuery {
    pub app: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptQuery {
    pub app: String,
    pub month: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupInput {
    pub application_id: i64,
    pub application_name: Option<String>,
    pub coach_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    /// ISO date; defaults to today when omitted.
    pub signup_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutreachMessagesQuery {
    pub application_id: Option<i64>,
    pub status: Option<String>,
}
