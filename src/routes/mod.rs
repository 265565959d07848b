use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod internal;
pub mod outreach;
pub mod payouts;
pub mod revenue;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(revenue::router())
        .merge(payouts::router())
        .merge(outreach::router())
        .merge(internal::router())
}
