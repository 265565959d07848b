use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

/// Reject requests whose Host header is not in the configured allowlist.
/// A `*` entry disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let trusted = &state.config.trusted_hosts;
    if trusted.iter().any(|host| host.trim() == "*") {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let hostname = host.split(':').next().unwrap_or_default().trim();

    if !hostname.is_empty()
        && trusted
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(hostname))
    {
        return next.run(request).await;
    }

    AppError::BadRequest(format!("Untrusted host '{hostname}'.")).into_response()
}
