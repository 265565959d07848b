use reqwest::Client;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::AppConfig;

const BREVO_API_URL: &str = "https://api.brevo.com/v3/smtp/email";
const MAX_RETRIES: i64 = 3;

/// Send all queued outreach messages and retry recent failures.
///
/// Each message is dispatched through its channel's provider (email via
/// Brevo, SMS via Twilio's Messaging Service) and the row is updated
/// with the provider id or the failure reason. In dry-run mode nothing
/// leaves the building; rows are marked sent with a `dry_run` id so the
/// idempotency key still prevents a later live double-send.
pub async fn process_queued_messages(
    pool: &PgPool,
    http_client: &Client,
    config: &AppConfig,
) -> (u32, u32) {
    let mut sent = 0u32;
    let mut failed = 0u32;

    let messages = match sqlx::query_as::<_, (String, String, String, String, String, i64)>(
        "SELECT id::text, channel, recipient, COALESCE(subject, ''), COALESCE(body, ''), retry_count
         FROM outreach_messages
         WHERE status = 'queued'
            OR (status = 'failed' AND retry_count < $1)
         ORDER BY created_at
         LIMIT 100",
    )
    .bind(MAX_RETRIES)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(error) => {
            warn!(error = %error, "Failed to fetch queued messages");
            return (0, 0);
        }
    };

    for (id, channel, recipient, subject, body, retry_count) in messages {
        if recipient.trim().is_empty() {
            let _ = mark_failed(pool, &id, retry_count, "empty recipient").await;
            failed += 1;
            continue;
        }

        let result = if config.outreach_dry_run {
            info!(channel, recipient, "DRY RUN — outreach message not sent");
            Ok("dry_run".to_string())
        } else {
            match channel.as_str() {
                "email" => send_email(http_client, config, &recipient, &subject, &body).await,
                "sms" => send_sms(http_client, config, &recipient, &body).await,
                other => Err(format!("unsupported channel '{other}'")),
            }
        };

        match result {
            Ok(provider_id) => {
                let _ = sqlx::query(
                    "UPDATE outreach_messages
                     SET status = 'sent', provider_message_id = $2, sent_at = now(), error_message = NULL
                     WHERE id = $1::uuid",
                )
                .bind(&id)
                .bind(&provider_id)
                .execute(pool)
                .await;
                sent += 1;
            }
            Err(error) => {
                warn!(message_id = %id, channel, error, "Outreach send failed");
                let _ = mark_failed(pool, &id, retry_count, &error).await;
                failed += 1;
            }
        }
    }

    if sent > 0 || failed > 0 {
        info!(sent, failed, "Dispatched outreach messages");
    }
    (sent, failed)
}

async fn mark_failed(
    pool: &PgPool,
    id: &str,
    retry_count: i64,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE outreach_messages
         SET status = 'failed', error_message = $2, retry_count = $3
         WHERE id = $1::uuid",
    )
    .bind(id)
    .bind(error)
    .bind(retry_count + 1)
    .execute(pool)
    .await?;
    Ok(())
}

/// Send a transactional email via the Brevo REST API.
/// Returns the provider message id.
async fn send_email(
    http_client: &Client,
    config: &AppConfig,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<String, String> {
    let api_key = config
        .brevo_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| "BREVO_API_KEY not configured".to_string())?;

    let payload = json!({
        "sender": {
            "email": config.brevo_from_email,
            "name": config.brevo_from_name,
        },
        "to": [{ "email": recipient }],
        "subject": subject,
        "htmlContent": body,
    });

    let response = http_client
        .post(BREVO_API_URL)
        .header("accept", "application/json")
        .header("api-key", api_key)
        .json(&payload)
        .send()
        .await
        .map_err(|error| format!("Brevo request failed: {error}"))?;

    let status = response.status();
    let resp_body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        Ok(resp_body
            .get("messageId")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    } else {
        let detail = resp_body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown Brevo error");
        Err(format!("Brevo error ({status}): {detail}"))
    }
}

/// Send an SMS via the Twilio Messaging Service (alpha sender "KLIQ").
/// Returns the message SID.
async fn send_sms(
    http_client: &Client,
    config: &AppConfig,
    recipient: &str,
    body: &str,
) -> Result<String, String> {
    let account_sid = config
        .twilio_account_sid
        .as_deref()
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| "TWILIO_ACCOUNT_SID not configured".to_string())?;
    let auth_token = config
        .twilio_auth_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| "TWILIO_AUTH_TOKEN not configured".to_string())?;
    let messaging_service_sid = config
        .twilio_messaging_service_sid
        .as_deref()
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| "TWILIO_MESSAGING_SERVICE_SID not configured".to_string())?;

    let url =
        format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json");

    let response = http_client
        .post(&url)
        .basic_auth(account_sid, Some(auth_token))
        .form(&[
            ("To", recipient),
            ("MessagingServiceSid", messaging_service_sid),
            ("Body", body),
        ])
        .send()
        .await
        .map_err(|error| format!("Twilio request failed: {error}"))?;

    let status = response.status();
    let resp_body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        Ok(resp_body
            .get("sid")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    } else {
        let detail = resp_body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown Twilio error");
        Err(format!("Twilio error ({status}): {detail}"))
    }
}
