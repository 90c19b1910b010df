//! Webhook HTTP surface.

pub mod handlers;

use crate::application::engine::ReconciliationEngine;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub fn router(engine: Arc<ReconciliationEngine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/webhooks/paystack", post(handlers::paystack_webhook))
        .route("/webhooks/monnify", post(handlers::monnify_webhook))
        .route("/webhooks/safehaven", post(handlers::safehaven_webhook))
        .route("/webhooks/bloc", post(handlers::bloc_webhook))
        .route("/webhooks/generic/{provider}", post(handlers::generic_webhook))
        .with_state(engine)
}
