use axum::{body::Bytes, extract::Extension, http::HeaderMap, http::StatusCode};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::billing::{decode_event, verify_signature, BillingEvent, Reconciler, SIGNATURE_HEADER};
use crate::config;
use crate::error::{AppError, AppResult};

/// key: webhooks-billing -> ingestion endpoint
///
/// The processor retries on any non-2xx response, so only transient failures
/// may answer 5xx. Verification happens against the raw body before anything
/// touches storage.
pub async fn billing_events(
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    verify_signature(&body, signature, config::BILLING_WEBHOOK_SECRET.as_str())?;

    let event = decode_event(&body)?;
    if let BillingEvent::Ignored { event_id, kind } = &event {
        info!(%event_id, %kind, "ignoring unhandled billing event type");
        return Ok(StatusCode::OK);
    }

    match Reconciler::new(pool).apply(&event).await {
        Ok(Some(record)) => {
            info!(
                event_id = event.event_id(),
                kind = event.kind(),
                account_id = %record.account_id,
                tier = record.tier.as_str(),
                status = record.status.as_str(),
                "billing event reconciled"
            );
            Ok(StatusCode::OK)
        }
        Ok(None) => Ok(StatusCode::OK),
        // Redelivery would hit the same missing record; ack so the processor
        // stops retrying and leave re-driving to the operator.
        Err(AppError::AccountNotFound) => {
            warn!(
                event_id = event.event_id(),
                kind = event.kind(),
                "dropping billing event for unknown account"
            );
            Ok(StatusCode::OK)
        }
        Err(err) => Err(err),
    }
}
