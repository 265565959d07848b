use std::env;

/// Apps excluded from every revenue aggregate (test/bot/internal apps).
const DEFAULT_EXCLUDED_APPS: &str =
    "Jupiter,Remote Coach - Default App,Remote Coach Creators,Dogpound,LDN Fit,Teach2Sweat";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub warehouse_db_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub report_cache_ttl_seconds: u64,
    pub report_cache_max_entries: usize,
    pub refresh_enabled: bool,
    pub refresh_interval_minutes: u64,
    // Store commissions, expressed 0-100. Google's is configuration rather
    // than a constant: the upstream sources disagree (30 vs 15 for small
    // developers), so the value must be decidable without a code change.
    pub apple_platform_fee_pct: f64,
    pub google_platform_fee_pct: f64,
    pub stripe_platform_fee_pct: f64,
    pub excluded_apps: Vec<String>,
    pub internal_api_key: Option<String>,
    pub outreach_enabled: bool,
    pub outreach_dry_run: bool,
    pub outreach_poll_interval_minutes: u64,
    pub outreach_signup_lookback_hours: i64,
    pub outreach_blocked_app_ids: Vec<i64>,
    pub outreach_blocked_email_domains: Vec<String>,
    pub brevo_api_key: Option<String>,
    pub brevo_from_email: String,
    pub brevo_from_name: String,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_messaging_service_sid: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "KLIQ Insights API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&env_or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            warehouse_db_url: env_opt("WAREHOUSE_DB_URL").or_else(|| env_opt("DATABASE_URL")),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            report_cache_ttl_seconds: env_parse_or("REPORT_CACHE_TTL_SECONDS", 600),
            report_cache_max_entries: env_parse_or("REPORT_CACHE_MAX_ENTRIES", 2000),
            refresh_enabled: env_parse_bool_or("REFRESH_ENABLED", true),
            refresh_interval_minutes: env_parse_or("REFRESH_INTERVAL_MINUTES", 10),
            apple_platform_fee_pct: env_parse_or("APPLE_PLATFORM_FEE_PCT", 30.0),
            google_platform_fee_pct: env_parse_or("GOOGLE_PLATFORM_FEE_PCT", 30.0),
            stripe_platform_fee_pct: env_parse_or("STRIPE_PLATFORM_FEE_PCT", 0.0),
            excluded_apps: parse_csv(&env_or("EXCLUDED_APPS", DEFAULT_EXCLUDED_APPS)),
            internal_api_key: env_opt("INTERNAL_API_KEY"),
            outreach_enabled: env_parse_bool_or("OUTREACH_ENABLED", true),
            outreach_dry_run: env_parse_bool_or("OUTREACH_DRY_RUN", false),
            outreach_poll_interval_minutes: env_parse_or("OUTREACH_POLL_INTERVAL_MINUTES", 15),
            outreach_signup_lookback_hours: env_parse_or("OUTREACH_SIGNUP_LOOKBACK_HOURS", 24),
            outreach_blocked_app_ids: parse_id_csv(&env_or("OUTREACH_BLOCKED_APP_IDS", "274764")),
            outreach_blocked_email_domains: parse_csv(&env_or(
                "OUTREACH_BLOCKED_EMAIL_DOMAINS",
                "joinkliq.io",
            )),
            brevo_api_key: env_opt("BREVO_API_KEY"),
            brevo_from_email: env_or("BREVO_FROM_EMAIL", "success@joinkliq.io"),
            brevo_from_name: env_or("BREVO_FROM_NAME", "KLIQ Success Team"),
            twilio_account_sid: env_opt("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: env_opt("TWILIO_AUTH_TOKEN"),
            twilio_messaging_service_sid: env_opt("TWILIO_MESSAGING_SERVICE_SID"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_id_csv(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|value| value.trim().parse::<i64>().ok())
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_csv, parse_id_csv};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_csv_lists() {
        assert_eq!(parse_csv("a, b ,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_id_csv("274764, x, 42"), vec![274764, 42]);
    }
}
