use crate::application::engine::{ReconciliationEngine, WebhookRequest};
use crate::application::result::ReconciliationResult;
use crate::domain::event::Provider;
use crate::error::{ErrorKind, ReconError};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

pub type WebhookResponse = (StatusCode, Json<ReconciliationResult>);

/// 200 for any definitive business outcome, 400 for unreadable or unauthenticated
/// deliveries, 500 when storage failed and the provider should redeliver.
pub fn status_for(result: &ReconciliationResult) -> StatusCode {
    match result.error_kind {
        None => StatusCode::OK,
        Some(ErrorKind::Transport | ErrorKind::Authenticity) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::Duplicate | ErrorKind::Validation | ErrorKind::IntegrityAnomaly) => {
            StatusCode::OK
        }
        Some(ErrorKind::Infrastructure) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn dispatch(
    engine: &ReconciliationEngine,
    provider: Provider,
    headers: &HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    let signature = provider
        .signature_header()
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let result = engine
        .process(WebhookRequest {
            provider,
            body: body.to_vec(),
            signature,
        })
        .await;
    (status_for(&result), Json(result))
}

pub async fn paystack_webhook(
    State(engine): State<Arc<ReconciliationEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    dispatch(&engine, Provider::Paystack, &headers, body).await
}

pub async fn monnify_webhook(
    State(engine): State<Arc<ReconciliationEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    dispatch(&engine, Provider::Monnify, &headers, body).await
}

pub async fn safehaven_webhook(
    State(engine): State<Arc<ReconciliationEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    dispatch(&engine, Provider::Safehaven, &headers, body).await
}

pub async fn bloc_webhook(
    State(engine): State<Arc<ReconciliationEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    dispatch(&engine, Provider::Bloc, &headers, body).await
}

/// Unlisted providers, named by the last path segment.
pub async fn generic_webhook(
    State(engine): State<Arc<ReconciliationEngine>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    match Provider::from_str(&provider) {
        Ok(provider) => dispatch(&engine, provider, &headers, body).await,
        Err(reason) => {
            let err = ReconError::UnsupportedProvider(reason);
            tracing::warn!(%provider, error = %err, "webhook for unsupported provider");
            let result = ReconciliationResult::failed("Unsupported provider", &err);
            (status_for(&result), Json(result))
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let ok = ReconciliationResult::acknowledged("ok");
        assert_eq!(status_for(&ok), StatusCode::OK);

        let cases = [
            (ReconError::Transport("bad".to_string()), StatusCode::BAD_REQUEST),
            (ReconError::Authenticity("bad".to_string()), StatusCode::BAD_REQUEST),
            (ReconError::Validation("bad".to_string()), StatusCode::OK),
            (ReconError::Storage("down".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let result = ReconciliationResult::failed("x", &err);
            assert_eq!(status_for(&result), expected, "{}", err);
        }
    }
}
