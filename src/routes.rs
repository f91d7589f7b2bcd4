use axum::{
    routing::{get, post},
    Router,
};

use crate::{billing, webhooks};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/billing/events", post(webhooks::billing_events))
        .route(
            "/api/accounts/:account_id/subscription",
            get(billing::api::get_subscription),
        )
        .route(
            "/api/accounts/:account_id/quota",
            get(billing::api::check_quota),
        )
}
