use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;

use super::models::{BillingEvent, SubscriptionRecord, SubscriptionStatus, Tier};
use crate::config;
use crate::error::AppError;

/// key: billing-reconciler -> event to subscription-record state machine
///
/// Every transition is a single atomic read-modify-write statement with
/// absolute assignments, so redelivered events are idempotent and two
/// overlapping deliveries for the same account cannot lose updates. Ordering
/// across events is last-write-wins; no causal fencing is attempted.
#[derive(Clone)]
pub struct Reconciler {
    pool: PgPool,
}

impl Reconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a verified event to the subscription record store. Returns the
    /// resulting record, or `None` for events this engine ignores.
    pub async fn apply(&self, event: &BillingEvent) -> Result<Option<SubscriptionRecord>, AppError> {
        match event {
            BillingEvent::CheckoutCompleted {
                account_id,
                tier,
                external_customer_id,
                external_subscription_id,
                period_start,
                period_end,
                ..
            } => self
                .apply_checkout(
                    account_id,
                    *tier,
                    external_customer_id,
                    external_subscription_id,
                    *period_start,
                    *period_end,
                )
                .await
                .map(Some),
            BillingEvent::SubscriptionUpdated {
                account_id,
                tier,
                status,
                period_start,
                period_end,
                ..
            } => {
                if status.is_active() {
                    self.apply_activation(account_id, *tier, *period_start, *period_end)
                        .await
                        .map(Some)
                } else {
                    self.apply_downgrade(account_id, status).await.map(Some)
                }
            }
            BillingEvent::SubscriptionCanceled {
                account_id, status, ..
            } => self.apply_downgrade(account_id, status).await.map(Some),
            BillingEvent::Ignored { .. } => Ok(None),
        }
    }

    /// Checkout grants the purchased tier and activates the billing period.
    /// The customer id is set once on the first checkout and kept afterwards;
    /// the subscription id is replaced, which covers cancel-then-resubscribe.
    async fn apply_checkout(
        &self,
        account_id: &str,
        tier: Tier,
        external_customer_id: &str,
        external_subscription_id: &str,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionRecord, AppError> {
        let now = Utc::now();
        let period_start = period_start.unwrap_or(now);
        let period_end =
            period_end.unwrap_or(period_start + Duration::days(*config::CHECKOUT_PERIOD_DAYS));

        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            INSERT INTO subscription_records (
                account_id,
                tier,
                status,
                external_customer_id,
                external_subscription_id,
                current_period_start,
                current_period_end,
                updated_at
            ) VALUES ($1, $2, 'ACTIVE', $3, $4, $5, $6, NOW())
            ON CONFLICT (account_id) DO UPDATE SET
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                external_customer_id = COALESCE(
                    subscription_records.external_customer_id,
                    EXCLUDED.external_customer_id
                ),
                external_subscription_id = EXCLUDED.external_subscription_id,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(tier.as_str())
        .bind(external_customer_id)
        .bind(external_subscription_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Processor reports the subscription active: refresh status and period;
    /// overwrite the tier only when the event carries one.
    async fn apply_activation(
        &self,
        account_id: &str,
        tier: Option<Tier>,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionRecord, AppError> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            UPDATE subscription_records SET
                tier = COALESCE($2, tier),
                status = 'ACTIVE',
                current_period_start = COALESCE($3, current_period_start),
                current_period_end = COALESCE($4, current_period_end),
                updated_at = NOW()
            WHERE account_id = $1
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(tier.map(|t| t.as_str()))
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| self.missing(account_id))
    }

    /// Any non-active processor status drops the account to the free tier and
    /// stores the status verbatim.
    async fn apply_downgrade(
        &self,
        account_id: &str,
        status: &SubscriptionStatus,
    ) -> Result<SubscriptionRecord, AppError> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            UPDATE subscription_records SET
                tier = 'FREE',
                status = $2,
                updated_at = NOW()
            WHERE account_id = $1
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| self.missing(account_id))
    }

    fn missing(&self, account_id: &str) -> AppError {
        warn!(%account_id, "billing event targets account with no subscription record");
        AppError::AccountNotFound
    }
}
