use axum::extract::{Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::repository::warehouse::{map_db_error, SignupRecord};
use crate::schemas::{validate_input, OutreachMessagesQuery, SignupInput};
use crate::services::sequences::{build_exclusion_rules, process_signup, SignupOutcome};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/outreach/signups", axum::routing::post(ingest_signup))
        .route("/outreach/messages", axum::routing::get(list_messages))
}

/// Ingest one sign-up directly (webhook-style) instead of waiting for the
/// next warehouse poll. Exclusion rules and idempotent enrollment apply
/// exactly as in the background path.
async fn ingest_signup(
    State(state): State<AppState>,
    Json(input): Json<SignupInput>,
) -> AppResult<Json<Value>> {
    validate_input(&input)?;
    let pool = db_pool(&state)?;

    let signup_date = match input.signup_date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("Invalid signup_date, expected YYYY-MM-DD.".to_string()))?,
        _ => Utc::now().date_naive(),
    };

    let signup = SignupRecord {
        application_id: input.application_id,
        application_name: input.application_name.unwrap_or_default(),
        coach_name: input.coach_name.unwrap_or_default(),
        email: input.email.unwrap_or_default(),
        phone: input.phone.unwrap_or_default(),
        signup_date,
    };

    let rules = build_exclusion_rules(&state).await;
    match process_signup(pool, &rules, &signup)
        .await
        .map_err(map_db_error)?
    {
        SignupOutcome::Enrolled => Ok(Json(json!({
            "application_id": signup.application_id,
            "status": "enrolled",
        }))),
        SignupOutcome::Excluded(reason) => Ok(Json(json!({
            "application_id": signup.application_id,
            "status": "excluded",
            "reason": reason,
        }))),
    }
}

/// Send-state inspection: which steps went to which prospects, and how
/// delivery went.
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<OutreachMessagesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "SELECT application_id, sequence_step, channel, recipient, status,
                COALESCE(provider_message_id, '') AS provider_message_id,
                COALESCE(error_message, '') AS error_message,
                retry_count,
                COALESCE(sent_at::text, '') AS sent_at,
                created_at::text AS created_at
         FROM outreach_messages WHERE 1=1",
    );
    if let Some(application_id) = query.application_id {
        builder
            .push(" AND application_id = ")
            .push_bind(application_id);
    }
    if let Some(status) = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND status = ").push_bind(status.to_string());
    }
    builder.push(" ORDER BY created_at DESC LIMIT 500");

    let rows = builder
        .build_query_as::<(
            i64,
            String,
            String,
            String,
            String,
            String,
            String,
            i64,
            String,
            String,
        )>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)?;

    let data: Vec<Value> = rows
        .into_iter()
        .map(
            |(
                application_id,
                sequence_step,
                channel,
                recipient,
                status,
                provider_message_id,
                error_message,
                retry_count,
                sent_at,
                created_at,
            )| {
                json!({
                    "application_id": application_id,
                    "sequence_step": sequence_step,
                    "channel": channel,
                    "recipient": recipient,
                    "status": status,
                    "provider_message_id": provider_message_id,
                    "error_message": error_message,
                    "retry_count": retry_count,
                    "sent_at": sent_at,
                    "created_at": created_at,
                })
            },
        )
        .collect();

    Ok(Json(json!({ "count": data.len(), "data": data })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Warehouse database is not configured. Set WAREHOUSE_DB_URL or DATABASE_URL."
                .to_string(),
        )
    })
}
