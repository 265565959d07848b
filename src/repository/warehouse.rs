use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::services::fees::FeeSchedule;
use crate::services::revenue::{
    AppleSaleRecord, BreakdownRow, Platform, PlayPurchaseEvent, StripeInvoiceRecord,
    UnifiedRevenueRow,
};

/// Apple product-type tags for in-app purchases (auto-renewing
/// subscriptions and consumables). Everything else in the sales feed is
/// downloads/redownloads and never contributes revenue.
const APPLE_IAP_PRODUCT_TYPES: &[&str] = &["IA1", "IAY"];

/// Insert batch size for snapshot writes.
const INSERT_CHUNK: usize = 500;

/// A new sign-up pulled from the product event stream, enriched with the
/// coach's contact details.
#[derive(Debug, Clone)]
pub struct SignupRecord {
    pub application_id: i64,
    pub application_name: String,
    pub coach_name: String,
    pub email: String,
    pub phone: String,
    pub signup_date: NaiveDate,
}

/// Create the service-owned tables when missing: the derived reporting
/// snapshot and the outreach state. Source warehouse tables (sales
/// feeds, events, invoices) are managed by the ingestion pipelines and
/// never created here.
pub async fn ensure_service_tables(pool: &PgPool) -> Result<(), AppError> {
    const DDL: &[&str] = &[
        "CREATE TABLE IF NOT EXISTS iap_revenue_breakdown (
            application_name text NOT NULL,
            month text NOT NULL,
            platform text NOT NULL,
            units bigint NOT NULL DEFAULT 0,
            sales double precision NOT NULL DEFAULT 0,
            platform_fee_pct double precision NOT NULL DEFAULT 0,
            platform_fee double precision NOT NULL DEFAULT 0,
            proceeds double precision NOT NULL DEFAULT 0,
            fee_pct double precision NOT NULL DEFAULT 0,
            fee_amount double precision NOT NULL DEFAULT 0,
            refund_amount double precision NOT NULL DEFAULT 0,
            payout double precision NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS unified_revenue (
            application_name text NOT NULL,
            month text NOT NULL,
            month_label text NOT NULL,
            month_sort bigint NOT NULL,
            revenue double precision NOT NULL DEFAULT 0,
            revenue_source text NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS outreach_prospects (
            application_id bigint PRIMARY KEY,
            application_name text NOT NULL DEFAULT '',
            coach_name text NOT NULL DEFAULT '',
            email text NOT NULL DEFAULT '',
            phone text NOT NULL DEFAULT '',
            greeting_name text NOT NULL DEFAULT '',
            is_personal boolean NOT NULL DEFAULT false,
            signup_date date,
            updated_at timestamptz NOT NULL DEFAULT now()
        )",
        "CREATE TABLE IF NOT EXISTS outreach_sequences (
            id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
            name text NOT NULL,
            trigger_event text NOT NULL,
            is_active boolean NOT NULL DEFAULT true,
            created_at timestamptz NOT NULL DEFAULT now()
        )",
        "CREATE TABLE IF NOT EXISTS outreach_steps (
            id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
            sequence_id uuid NOT NULL REFERENCES outreach_sequences(id),
            step_order int NOT NULL,
            channel text NOT NULL DEFAULT 'email',
            subject text NOT NULL DEFAULT '',
            body_template text NOT NULL DEFAULT '',
            delay_hours int NOT NULL DEFAULT 0,
            UNIQUE (sequence_id, step_order)
        )",
        "CREATE TABLE IF NOT EXISTS outreach_enrollments (
            id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
            sequence_id uuid NOT NULL REFERENCES outreach_sequences(id),
            application_id bigint NOT NULL,
            current_step int NOT NULL DEFAULT 1,
            status text NOT NULL DEFAULT 'active',
            next_send_at timestamptz NOT NULL DEFAULT now(),
            recipient text NOT NULL DEFAULT '',
            context jsonb NOT NULL DEFAULT '{}'::jsonb,
            UNIQUE (sequence_id, application_id)
        )",
        "CREATE TABLE IF NOT EXISTS outreach_messages (
            id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
            application_id bigint NOT NULL,
            sequence_step text NOT NULL,
            channel text NOT NULL,
            recipient text NOT NULL,
            status text NOT NULL DEFAULT 'queued',
            subject text NOT NULL DEFAULT '',
            body text NOT NULL DEFAULT '',
            provider_message_id text,
            error_message text,
            retry_count bigint NOT NULL DEFAULT 0,
            sent_at timestamptz,
            created_at timestamptz NOT NULL DEFAULT now(),
            UNIQUE (application_id, sequence_step, channel)
        )",
    ];

    for statement in DDL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(map_db_error)?;
    }
    Ok(())
}

pub async fn load_apple_sales(pool: &PgPool) -> Result<Vec<AppleSaleRecord>, AppError> {
    let types: Vec<String> = APPLE_IAP_PRODUCT_TYPES
        .iter()
        .map(|value| value.to_string())
        .collect();

    let rows = sqlx::query_as::<_, (String, NaiveDate, i64, f64, f64, String)>(
        "SELECT
             COALESCE(sku, '') AS sku,
             report_date::date AS report_date,
             COALESCE(units, 0)::bigint AS units,
             COALESCE(customer_price, 0)::float8 AS customer_price,
             COALESCE(developer_proceeds, 0)::float8 AS developer_proceeds,
             COALESCE(customer_currency, 'USD') AS customer_currency
         FROM appstore_sales
         WHERE product_type_identifier = ANY($1)
           AND report_date IS NOT NULL",
    )
    .bind(&types)
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(rows
        .into_iter()
        .map(
            |(sku, report_date, units, customer_price, developer_proceeds, currency)| {
                AppleSaleRecord {
                    sku,
                    report_date,
                    units,
                    customer_price,
                    developer_proceeds,
                    currency,
                }
            },
        )
        .collect())
}

/// SKU → canonical app name. Incomplete by nature; unmapped SKUs
/// aggregate under "Unknown" downstream.
pub async fn load_sku_map(pool: &PgPool) -> Result<HashMap<String, String>, AppError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT DISTINCT product_id, application_name
         FROM inapp_products
         WHERE product_id IS NOT NULL AND application_name IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(rows.into_iter().collect())
}

pub async fn load_fee_schedule(pool: &PgPool) -> Result<FeeSchedule, AppError> {
    let rows = sqlx::query_as::<_, (String, f64)>(
        "SELECT application_name, COALESCE(kliq_fee_pct, 0)::float8
         FROM app_fee_lookup
         WHERE application_name IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(FeeSchedule::new(rows))
}

/// Google Play purchase-completed events. These carry no amounts; the
/// revenue estimator prices them from Apple history.
pub async fn load_play_purchases(pool: &PgPool) -> Result<Vec<PlayPurchaseEvent>, AppError> {
    let rows = sqlx::query_as::<_, (String, NaiveDate, String)>(
        "SELECT
             a.application_name,
             e.event_date::date,
             COALESCE(e.data ->> 'in_app_product_id', '') AS product_id
         FROM events e
         LEFT JOIN applications a ON a.id = e.application_id
         WHERE e.event_name = 'purchase_success'
           AND a.application_name IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(rows
        .into_iter()
        .map(|(application_name, event_date, product_id)| PlayPurchaseEvent {
            application_name,
            event_date,
            product_id,
        })
        .collect())
}

pub async fn load_stripe_invoices(pool: &PgPool) -> Result<Vec<StripeInvoiceRecord>, AppError> {
    let rows = sqlx::query_as::<_, (String, NaiveDate, i64, String)>(
        "SELECT
             a.application_name,
             i.paid_at::date,
             COALESCE(i.amount_paid, 0)::bigint,
             COALESCE(i.currency, 'usd')
         FROM subscription_invoices i
         LEFT JOIN applications a ON a.id = i.application_id
         WHERE i.status = 'paid'
           AND i.paid_at IS NOT NULL
           AND a.application_name IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(rows
        .into_iter()
        .map(
            |(application_name, paid_at, amount_cents, currency)| StripeInvoiceRecord {
                application_name,
                paid_at,
                amount_cents,
                currency,
            },
        )
        .collect())
}

/// Apps with an active paid subscription — excluded from cold outreach.
pub async fn load_active_subscriber_ids(pool: &PgPool) -> Result<HashSet<i64>, AppError> {
    let rows = sqlx::query_as::<_, (i64,)>(
        "SELECT DISTINCT application_id::bigint
         FROM subscription_details
         WHERE status = 'active' AND application_id IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Sign-ups within the lookback window, one row per application with the
/// most recently created coach user's contact details.
pub async fn load_recent_signups(
    pool: &PgPool,
    lookback_hours: i64,
) -> Result<Vec<SignupRecord>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, String, NaiveDate)>(
        "SELECT DISTINCT ON (e.application_id)
             e.application_id::bigint,
             COALESCE(a.application_name, '') AS application_name,
             COALESCE(u.full_name, '') AS coach_name,
             COALESCE(u.email, '') AS email,
             COALESCE(u.phone, '') AS phone,
             e.event_date::date AS signup_date
         FROM events e
         LEFT JOIN applications a ON a.id = e.application_id
         LEFT JOIN users u ON u.application_id = e.application_id AND u.user_type = 4
         WHERE e.event_name = 'self_serve_completed_create_account'
           AND e.event_date >= now() - make_interval(hours => $1::int)
         ORDER BY e.application_id, u.created_at DESC NULLS LAST",
    )
    .bind(lookback_hours)
    .fetch_all(pool)
    .await
    .map_err(map_db_error)?;

    Ok(rows
        .into_iter()
        .map(
            |(application_id, application_name, coach_name, email, phone, signup_date)| {
                SignupRecord {
                    application_id,
                    application_name,
                    coach_name,
                    email,
                    phone,
                    signup_date,
                }
            },
        )
        .collect())
}

/// Replace both derived reporting tables with a freshly computed
/// snapshot, atomically. Every refresh recomputes from scratch; there is
/// no incremental mutation to reconcile.
pub async fn store_revenue_snapshot(
    pool: &PgPool,
    breakdown: &[BreakdownRow],
    unified: &[UnifiedRevenueRow],
) -> Result<(), AppError> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;

    sqlx::query("TRUNCATE iap_revenue_breakdown")
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

    for chunk in breakdown.chunks(INSERT_CHUNK) {
        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO iap_revenue_breakdown
             (application_name, month, platform, units, sales, platform_fee_pct,
              platform_fee, proceeds, fee_pct, fee_amount, refund_amount, payout) ",
        );
        query.push_values(chunk, |mut row, item| {
            row.push_bind(&item.application_name)
                .push_bind(&item.month)
                .push_bind(item.platform.as_str())
                .push_bind(item.units)
                .push_bind(item.sales)
                .push_bind(item.platform_fee_pct)
                .push_bind(item.platform_fee)
                .push_bind(item.proceeds)
                .push_bind(item.fee_pct)
                .push_bind(item.fee_amount)
                .push_bind(item.refund_amount)
                .push_bind(item.payout);
        });
        query.build().execute(&mut *tx).await.map_err(map_db_error)?;
    }

    sqlx::query("TRUNCATE unified_revenue")
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

    for chunk in unified.chunks(INSERT_CHUNK) {
        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO unified_revenue
             (application_name, month, month_label, month_sort, revenue, revenue_source) ",
        );
        query.push_values(chunk, |mut row, item| {
            row.push_bind(&item.application_name)
                .push_bind(&item.month)
                .push_bind(&item.month_label)
                .push_bind(item.month_sort)
                .push_bind(item.revenue)
                .push_bind(&item.revenue_source);
        });
        query.build().execute(&mut *tx).await.map_err(map_db_error)?;
    }

    tx.commit().await.map_err(map_db_error)
}

/// Read breakdown rows from the snapshot with optional filters.
pub async fn load_breakdown_rows(
    pool: &PgPool,
    application_name: Option<&str>,
    platform: Option<Platform>,
    month_from: Option<&str>,
    month_to: Option<&str>,
) -> Result<Vec<BreakdownRow>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT application_name, month, platform, units, sales, platform_fee_pct,
                platform_fee, proceeds, fee_pct, fee_amount, refund_amount, payout
         FROM iap_revenue_breakdown WHERE 1=1",
    );
    if let Some(app) = application_name {
        query.push(" AND application_name = ").push_bind(app);
    }
    if let Some(platform) = platform {
        query.push(" AND platform = ").push_bind(platform.as_str());
    }
    if let Some(from) = month_from {
        query.push(" AND month >= ").push_bind(from);
    }
    if let Some(to) = month_to {
        query.push(" AND month <= ").push_bind(to);
    }
    query.push(" ORDER BY month DESC, application_name, platform");

    let rows = query
        .build_query_as::<(
            String,
            String,
            String,
            i64,
            f64,
            f64,
            f64,
            f64,
            f64,
            f64,
            f64,
            f64,
        )>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)?;

    Ok(rows
        .into_iter()
        .filter_map(
            |(
                application_name,
                month,
                platform,
                units,
                sales,
                platform_fee_pct,
                platform_fee,
                proceeds,
                fee_pct,
                fee_amount,
                refund_amount,
                payout,
            )| {
                Some(BreakdownRow {
                    application_name,
                    month,
                    platform: Platform::parse(&platform)?,
                    units,
                    sales,
                    platform_fee_pct,
                    platform_fee,
                    proceeds,
                    fee_pct,
                    fee_amount,
                    refund_amount,
                    payout,
                })
            },
        )
        .collect())
}

/// Read the unified revenue table, newest months first.
pub async fn load_unified_rows(
    pool: &PgPool,
    application_name: Option<&str>,
) -> Result<Vec<UnifiedRevenueRow>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT application_name, month, month_label, month_sort, revenue, revenue_source
         FROM unified_revenue WHERE 1=1",
    );
    if let Some(app) = application_name {
        query.push(" AND application_name = ").push_bind(app);
    }
    query.push(" ORDER BY month_sort DESC, application_name");

    let rows = query
        .build_query_as::<(String, String, String, i64, f64, String)>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)?;

    Ok(rows
        .into_iter()
        .map(
            |(application_name, month, month_label, month_sort, revenue, revenue_source)| {
                UnifiedRevenueRow {
                    application_name,
                    month,
                    month_label,
                    month_sort,
                    revenue,
                    revenue_source,
                }
            },
        )
        .collect())
}

pub(crate) fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Warehouse query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Warehouse operation failed.".to_string())
}
