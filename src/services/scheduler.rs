use std::time::Duration;

use tokio::time::sleep;

use crate::state::AppState;

/// Spawn the background scheduler that runs periodic jobs.
///
/// Each job runs in its own `tokio::spawn` so a failure in one job
/// never crashes the scheduler loop or other jobs. Both jobs fire once
/// shortly after startup so a fresh deploy serves data without waiting a
/// full interval.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    if state.db_pool.is_none() {
        tracing::warn!("Scheduler: no database pool configured, exiting");
        return;
    }

    let refresh_interval =
        Duration::from_secs(state.config.refresh_interval_minutes.max(1) * 60);
    let outreach_interval =
        Duration::from_secs(state.config.outreach_poll_interval_minutes.max(1) * 60);

    let mut last_refresh_run: Option<tokio::time::Instant> = None;
    let mut last_outreach_run: Option<tokio::time::Instant> = None;

    loop {
        sleep(Duration::from_secs(15)).await;
        let now = tokio::time::Instant::now();

        // --- Revenue snapshot refresh (every N minutes) ---
        if state.config.refresh_enabled
            && last_refresh_run.is_none_or(|last| now.duration_since(last) >= refresh_interval)
        {
            last_refresh_run = Some(now);
            let state = state.clone();
            tokio::spawn(async move {
                match crate::services::refresh::refresh_revenue_snapshot(&state).await {
                    Ok(summary) => {
                        tracing::info!(
                            breakdown = summary.breakdown_rows,
                            unified = summary.unified_rows,
                            "Scheduler: revenue snapshot refreshed"
                        );
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Scheduler: revenue refresh failed");
                    }
                }
            });
        }

        // --- Outreach: poll sign-ups, advance sequences, dispatch ---
        if state.config.outreach_enabled
            && last_outreach_run.is_none_or(|last| now.duration_since(last) >= outreach_interval)
        {
            last_outreach_run = Some(now);
            let state = state.clone();
            tokio::spawn(async move {
                let Some(pool) = state.db_pool.clone() else {
                    return;
                };
                let (enrolled, excluded) =
                    crate::services::sequences::poll_new_signups(&state).await;
                let (queued, step_errors) =
                    crate::services::sequences::process_due_steps(&pool).await;
                let (sent, send_failures) = crate::services::messaging::process_queued_messages(
                    &pool,
                    &state.http_client,
                    &state.config,
                )
                .await;
                if enrolled + queued + sent > 0 || step_errors + send_failures > 0 {
                    tracing::info!(
                        enrolled,
                        excluded,
                        queued,
                        sent,
                        errors = step_errors + send_failures,
                        "Scheduler: outreach cycle completed"
                    );
                }
            });
        }
    }
}
