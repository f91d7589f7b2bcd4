use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

// key: billing-models -> subscription records, usage counters, events

/// Subscription plan level controlling the metered-action quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Basis,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Basis => "BASIS",
            Tier::Pro => "PRO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "FREE" => Some(Tier::Free),
            "BASIS" => Some(Tier::Basis),
            "PRO" => Some(Tier::Pro),
            _ => None,
        }
    }
}

/// Processor subscription lifecycle vocabulary. Values outside the handled
/// set are stored verbatim, uppercased, so new processor statuses never break
/// reconciliation. Only the literal `Active` tag grants paid-tier quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Incomplete,
    Unpaid,
    Other(String),
}

impl SubscriptionStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "ACTIVE" => SubscriptionStatus::Active,
            "PAST_DUE" => SubscriptionStatus::PastDue,
            "CANCELED" => SubscriptionStatus::Canceled,
            "INCOMPLETE" => SubscriptionStatus::Incomplete,
            "UNPAID" => SubscriptionStatus::Unpaid,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::Incomplete => "INCOMPLETE",
            SubscriptionStatus::Unpaid => "UNPAID",
            SubscriptionStatus::Other(raw) => raw,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

impl Serialize for SubscriptionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// key: subscription-record -> one row per account, owned by the reconciler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRecord {
    pub account_id: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SubscriptionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let tier: String = row.try_get("tier")?;
        let status: String = row.try_get("status")?;
        Ok(SubscriptionRecord {
            account_id: row.try_get("account_id")?,
            tier: Tier::parse(&tier).unwrap_or(Tier::Free),
            status: SubscriptionStatus::from_provider(&status),
            external_customer_id: row.try_get("external_customer_id")?,
            external_subscription_id: row.try_get("external_subscription_id")?,
            current_period_start: row.try_get("current_period_start")?,
            current_period_end: row.try_get("current_period_end")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// key: usage-counter -> one row per account, owned by the quota enforcer
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct UsageCounter {
    pub account_id: String,
    pub count: i64,
    pub reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed billing event produced by ingestion and consumed by the reconciler.
/// Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted {
        event_id: String,
        account_id: String,
        tier: Tier,
        external_customer_id: String,
        external_subscription_id: String,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
    },
    SubscriptionUpdated {
        event_id: String,
        account_id: String,
        tier: Option<Tier>,
        status: SubscriptionStatus,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
    },
    SubscriptionCanceled {
        event_id: String,
        account_id: String,
        status: SubscriptionStatus,
    },
    /// Event type this engine does not handle; acknowledged without effect.
    Ignored { event_id: String, kind: String },
}

impl BillingEvent {
    pub fn event_id(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { event_id, .. }
            | BillingEvent::SubscriptionUpdated { event_id, .. }
            | BillingEvent::SubscriptionCanceled { event_id, .. }
            | BillingEvent::Ignored { event_id, .. } => event_id,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { .. } => "checkout.completed",
            BillingEvent::SubscriptionUpdated { .. } => "subscription.updated",
            BillingEvent::SubscriptionCanceled { .. } => "subscription.canceled",
            BillingEvent::Ignored { kind, .. } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_status_is_kept_verbatim_uppercased() {
        let status = SubscriptionStatus::from_provider("incomplete_expired");
        assert_eq!(
            status,
            SubscriptionStatus::Other("INCOMPLETE_EXPIRED".to_string())
        );
        assert_eq!(status.as_str(), "INCOMPLETE_EXPIRED");
    }

    #[test]
    fn only_the_literal_active_status_counts_as_active() {
        assert!(SubscriptionStatus::from_provider("active").is_active());
        assert!(!SubscriptionStatus::from_provider("past_due").is_active());
        assert!(!SubscriptionStatus::from_provider("trialing").is_active());
        assert!(!SubscriptionStatus::from_provider("paused").is_active());
    }

    #[test]
    fn tier_parse_is_case_insensitive_and_strict() {
        assert_eq!(Tier::parse("pro"), Some(Tier::Pro));
        assert_eq!(Tier::parse("BASIS"), Some(Tier::Basis));
        assert_eq!(Tier::parse("enterprise"), None);
    }
}
