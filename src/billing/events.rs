use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::models::{BillingEvent, SubscriptionStatus, Tier};
use crate::error::AppError;

/// Header carrying the processor's HMAC signature over the raw request body.
pub const SIGNATURE_HEADER: &str = "x-billing-signature";

// key: billing-ingestion -> signature check + payload decoding

/// Verify the processor signature against the raw payload bytes. The raw body
/// must be used here; a re-serialized copy would not match.
pub fn verify_signature(body: &[u8], header: Option<&str>, secret: &str) -> Result<(), AppError> {
    let provided = header.ok_or(AppError::VerificationFailed)?;
    let expected = {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can use any key length");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    };
    if expected != provided {
        return Err(AppError::VerificationFailed);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutPayload {
    account_id: String,
    tier: String,
    customer_id: String,
    subscription_id: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    period_start: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionPayload {
    account_id: String,
    status: String,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    period_start: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    period_end: Option<DateTime<Utc>>,
}

/// Decode a verified payload into a typed [`BillingEvent`]. Event types this
/// engine does not handle decode to [`BillingEvent::Ignored`] so new processor
/// vocabulary never breaks ingestion.
pub fn decode_event(raw: &[u8]) -> Result<BillingEvent, AppError> {
    let envelope: EventEnvelope = serde_json::from_slice(raw)
        .map_err(|err| AppError::MalformedEvent(format!("invalid event envelope: {err}")))?;

    match envelope.kind.as_str() {
        "checkout.completed" => {
            let payload: CheckoutPayload = decode_data(&envelope.kind, envelope.data)?;
            let tier = Tier::parse(&payload.tier).ok_or_else(|| {
                AppError::MalformedEvent(format!("unknown tier `{}` in checkout", payload.tier))
            })?;
            Ok(BillingEvent::CheckoutCompleted {
                event_id: envelope.id,
                account_id: payload.account_id,
                tier,
                external_customer_id: payload.customer_id,
                external_subscription_id: payload.subscription_id,
                period_start: payload.period_start,
                period_end: payload.period_end,
            })
        }
        "subscription.updated" => {
            let payload: SubscriptionPayload = decode_data(&envelope.kind, envelope.data)?;
            let tier = match payload.tier {
                Some(raw) => Some(Tier::parse(&raw).ok_or_else(|| {
                    AppError::MalformedEvent(format!("unknown tier `{raw}` in update"))
                })?),
                None => None,
            };
            Ok(BillingEvent::SubscriptionUpdated {
                event_id: envelope.id,
                account_id: payload.account_id,
                tier,
                status: SubscriptionStatus::from_provider(&payload.status),
                period_start: payload.period_start,
                period_end: payload.period_end,
            })
        }
        "subscription.canceled" => {
            let payload: SubscriptionPayload = decode_data(&envelope.kind, envelope.data)?;
            Ok(BillingEvent::SubscriptionCanceled {
                event_id: envelope.id,
                account_id: payload.account_id,
                status: SubscriptionStatus::from_provider(&payload.status),
            })
        }
        _ => Ok(BillingEvent::Ignored {
            event_id: envelope.id,
            kind: envelope.kind,
        }),
    }
}

fn decode_data<T: serde::de::DeserializeOwned>(
    kind: &str,
    data: serde_json::Value,
) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|err| AppError::MalformedEvent(format!("invalid `{kind}` payload: {err}")))
}
