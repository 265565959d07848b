use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::repository::warehouse::{self, SignupRecord};
use crate::services::outreach::{render_template, resolve_greeting, ExclusionRules};
use crate::state::AppState;

/// Outcome of processing one sign-up.
#[derive(Debug, Clone, PartialEq)]
pub enum SignupOutcome {
    Enrolled,
    Excluded(String),
}

/// Poll the warehouse for recent sign-ups and enroll each new prospect
/// into the active "signup" sequences. Existing enrollments and send
/// records make this safe to run on every poll cycle.
pub async fn poll_new_signups(state: &AppState) -> (u32, u32) {
    let Some(pool) = state.db_pool.as_ref() else {
        warn!("Outreach poll skipped: no database pool configured");
        return (0, 0);
    };

    let signups =
        match warehouse::load_recent_signups(pool, state.config.outreach_signup_lookback_hours)
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                warn!(error = %error, "Failed to fetch recent sign-ups");
                return (0, 0);
            }
        };

    let rules = build_exclusion_rules(state).await;

    let mut enrolled = 0u32;
    let mut excluded = 0u32;
    for signup in signups {
        match process_signup(pool, &rules, &signup).await {
            Ok(SignupOutcome::Enrolled) => enrolled += 1,
            Ok(SignupOutcome::Excluded(reason)) => {
                tracing::debug!(
                    application_id = signup.application_id,
                    reason,
                    "Sign-up excluded from outreach"
                );
                excluded += 1;
            }
            Err(error) => {
                warn!(
                    application_id = signup.application_id,
                    error = %error,
                    "Failed to process sign-up"
                );
            }
        }
    }

    if enrolled > 0 || excluded > 0 {
        info!(enrolled, excluded, "Processed new sign-ups");
    }
    (enrolled, excluded)
}

pub async fn build_exclusion_rules(state: &AppState) -> ExclusionRules {
    let mut rules = ExclusionRules::new(
        &state.config.outreach_blocked_app_ids,
        &state.config.outreach_blocked_email_domains,
    );
    if let Some(pool) = state.db_pool.as_ref() {
        match warehouse::load_active_subscriber_ids(pool).await {
            Ok(ids) => rules.active_app_ids = ids,
            Err(error) => {
                // Fail open on the subscriber check: a missed exclusion is
                // recoverable, a skipped poll cycle is lost outreach.
                warn!(error = %error, "Could not load active subscriber ids");
            }
        }
    }
    rules
}

/// Upsert the prospect and enroll them into matching sequences.
pub async fn process_signup(
    pool: &PgPool,
    rules: &ExclusionRules,
    signup: &SignupRecord,
) -> Result<SignupOutcome, sqlx::Error> {
    let email = non_empty(&signup.email);
    if let Some(reason) = rules.exclusion_reason(signup.application_id, email) {
        return Ok(SignupOutcome::Excluded(reason));
    }

    let display_name = if signup.coach_name.trim().is_empty() {
        signup.application_name.trim()
    } else {
        signup.coach_name.trim()
    };
    let (greeting, is_personal) = resolve_greeting(display_name, non_empty(&signup.application_name));

    sqlx::query(
        "INSERT INTO outreach_prospects
             (application_id, application_name, coach_name, email, phone,
              greeting_name, is_personal, signup_date, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
         ON CONFLICT (application_id) DO UPDATE SET
             application_name = COALESCE(NULLIF(EXCLUDED.application_name, ''), outreach_prospects.application_name),
             coach_name = COALESCE(NULLIF(EXCLUDED.coach_name, ''), outreach_prospects.coach_name),
             email = COALESCE(NULLIF(EXCLUDED.email, ''), outreach_prospects.email),
             phone = COALESCE(NULLIF(EXCLUDED.phone, ''), outreach_prospects.phone),
             greeting_name = EXCLUDED.greeting_name,
             is_personal = EXCLUDED.is_personal,
             updated_at = now()",
    )
    .bind(signup.application_id)
    .bind(signup.application_name.trim())
    .bind(signup.coach_name.trim())
    .bind(signup.email.trim())
    .bind(signup.phone.trim())
    .bind(&greeting)
    .bind(is_personal)
    .bind(signup.signup_date)
    .execute(pool)
    .await?;

    let mut context = Map::new();
    context.insert("first_name".to_string(), Value::String(greeting));
    context.insert(
        "app_name".to_string(),
        Value::String(signup.application_name.trim().to_string()),
    );

    enroll_in_sequences(pool, "signup", signup, &context).await?;
    Ok(SignupOutcome::Enrolled)
}

/// Enroll a prospect into every active sequence matching the trigger.
/// Re-enrollment is a no-op via the (sequence, application) unique key.
async fn enroll_in_sequences(
    pool: &PgPool,
    trigger_event: &str,
    signup: &SignupRecord,
    context: &Map<String, Value>,
) -> Result<(), sqlx::Error> {
    let sequences = sqlx::query_as::<_, (String, i64)>(
        "SELECT s.id::text,
                COALESCE((SELECT st.delay_hours FROM outreach_steps st
                          WHERE st.sequence_id = s.id AND st.step_order = 1), 0)::bigint
         FROM outreach_sequences s
         WHERE s.trigger_event = $1 AND s.is_active = true
         LIMIT 20",
    )
    .bind(trigger_event)
    .fetch_all(pool)
    .await?;

    // Prefer email; SMS steps fall back to the phone column at send time.
    let recipient = if signup.email.trim().is_empty() {
        signup.phone.trim()
    } else {
        signup.email.trim()
    };
    if recipient.is_empty() {
        return Ok(());
    }

    for (sequence_id, first_delay_hours) in sequences {
        sqlx::query(
            "INSERT INTO outreach_enrollments
                 (sequence_id, application_id, current_step, status, next_send_at, recipient, context)
             VALUES ($1::uuid, $2, 1, 'active', now() + make_interval(hours => $3::int), $4, $5)
             ON CONFLICT (sequence_id, application_id) DO NOTHING",
        )
        .bind(&sequence_id)
        .bind(signup.application_id)
        .bind(first_delay_hours)
        .bind(recipient)
        .bind(Value::Object(context.clone()))
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Process all active enrollments whose next step is due: render the step
/// template, queue the message, and advance (or complete) the enrollment.
///
/// The queued message carries a unique (application, step, channel) key,
/// so a prospect can never be double-sent the same step even if an
/// enrollment is re-processed.
pub async fn process_due_steps(pool: &PgPool) -> (u32, u32) {
    let mut queued = 0u32;
    let mut errors = 0u32;

    let enrollments = match sqlx::query_as::<_, (String, String, i64, i32, String, Value)>(
        "SELECT id::text, sequence_id::text, application_id, current_step, recipient,
                COALESCE(context, '{}'::jsonb)
         FROM outreach_enrollments
         WHERE status = 'active' AND next_send_at <= now()
         ORDER BY next_send_at
         LIMIT 100",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(error) => {
            warn!(error = %error, "Failed to fetch due enrollments");
            return (0, 0);
        }
    };

    for (enrollment_id, sequence_id, application_id, current_step, recipient, context) in
        enrollments
    {
        let context = context.as_object().cloned().unwrap_or_default();

        let step = match sqlx::query_as::<_, (String, String, String)>(
            "SELECT COALESCE(channel, 'email'), COALESCE(subject, ''), COALESCE(body_template, '')
             FROM outreach_steps
             WHERE sequence_id = $1::uuid AND step_order = $2
             LIMIT 1",
        )
        .bind(&sequence_id)
        .bind(current_step)
        .fetch_optional(pool)
        .await
        {
            Ok(step) => step,
            Err(error) => {
                warn!(error = %error, enrollment_id, "Failed to load sequence step");
                errors += 1;
                continue;
            }
        };

        let Some((channel, subject, body_template)) = step else {
            // Ran past the last step: the enrollment is done.
            let _ = set_enrollment_status(pool, &enrollment_id, "completed").await;
            continue;
        };

        let body = render_template(&body_template, &context);
        let subject = render_template(&subject, &context);
        let step_key = format!("{sequence_id}:{current_step}");

        let inserted = sqlx::query(
            "INSERT INTO outreach_messages
                 (application_id, sequence_step, channel, recipient, status, subject, body, retry_count)
             VALUES ($1, $2, $3, $4, 'queued', $5, $6, 0)
             ON CONFLICT (application_id, sequence_step, channel) DO NOTHING",
        )
        .bind(application_id)
        .bind(&step_key)
        .bind(&channel)
        .bind(&recipient)
        .bind(&subject)
        .bind(&body)
        .execute(pool)
        .await;

        match inserted {
            Ok(result) => {
                if result.rows_affected() > 0 {
                    queued += 1;
                }
            }
            Err(error) => {
                warn!(error = %error, enrollment_id, "Failed to queue outreach message");
                errors += 1;
                continue;
            }
        }

        if let Err(error) = advance_enrollment(pool, &enrollment_id, &sequence_id, current_step).await
        {
            warn!(error = %error, enrollment_id, "Failed to advance enrollment");
            errors += 1;
        }
    }

    if queued > 0 || errors > 0 {
        info!(queued, errors, "Processed outreach sequences");
    }
    (queued, errors)
}

async fn advance_enrollment(
    pool: &PgPool,
    enrollment_id: &str,
    sequence_id: &str,
    current_step: i32,
) -> Result<(), sqlx::Error> {
    let next_step = current_step + 1;
    let next_delay = sqlx::query_as::<_, (i64,)>(
        "SELECT COALESCE(delay_hours, 0)::bigint
         FROM outreach_steps
         WHERE sequence_id = $1::uuid AND step_order = $2
         LIMIT 1",
    )
    .bind(sequence_id)
    .bind(next_step)
    .fetch_optional(pool)
    .await?;

    match next_delay {
        Some((delay_hours,)) => {
            sqlx::query(
                "UPDATE outreach_enrollments
                 SET current_step = $2, next_send_at = now() + make_interval(hours => $3::int)
                 WHERE id = $1::uuid",
            )
            .bind(enrollment_id)
            .bind(next_step)
            .bind(delay_hours)
            .execute(pool)
            .await?;
        }
        None => {
            set_enrollment_status(pool, enrollment_id, "completed").await?;
        }
    }
    Ok(())
}

async fn set_enrollment_status(
    pool: &PgPool,
    enrollment_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outreach_enrollments SET status = $2 WHERE id = $1::uuid")
        .bind(enrollment_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
