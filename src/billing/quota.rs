use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};

use super::models::{SubscriptionStatus, Tier, UsageCounter};
use crate::config;
use crate::error::AppError;

/// key: quota-enforcer -> two-phase metered-action gate
///
/// `check` answers whether the account may perform the metered action now and
/// never increments; `commit` increments by exactly one and is only called by
/// the caller after the metered action has fully succeeded. Both run as a
/// single atomic statement per account so concurrent requests cannot observe
/// a pre-reset counter twice or apply a stale increment.
#[derive(Clone)]
pub struct QuotaEnforcer {
    pool: PgPool,
}

/// Outcome of the read phase. Storage failures surface as errors, distinct
/// from `allowed = false` (quota exhausted).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i64,
    /// `None` means unlimited.
    pub limit: Option<i64>,
    pub reset_at: DateTime<Utc>,
}

impl QuotaEnforcer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the counter (lazily resetting it at the monthly boundary), read
    /// the subscription fresh, and gate usage against the tier's allowance.
    pub async fn check(&self, account_id: &str) -> Result<QuotaDecision, AppError> {
        let now = Utc::now();
        let counter = self.touch_counter(account_id, now).await?;
        let limit = monthly_limit(self.effective_tier(account_id).await?);
        let allowed = limit.map_or(true, |limit| counter.count < limit);

        Ok(QuotaDecision {
            allowed,
            used: counter.count,
            limit,
            reset_at: counter.reset_at,
        })
    }

    /// Record one successful metered action. Does not enforce the limit; the
    /// caller gates with [`check`](Self::check) before attempting the action.
    pub async fn commit(&self, account_id: &str) -> Result<i64, AppError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO usage_counters (account_id, count, reset_at, updated_at)
            VALUES ($1, 1, $2, NOW())
            ON CONFLICT (account_id) DO UPDATE SET
                count = CASE
                    WHEN usage_counters.reset_at <= $3 THEN 1
                    ELSE usage_counters.count + 1
                END,
                reset_at = CASE
                    WHEN usage_counters.reset_at <= $3 THEN $2
                    ELSE usage_counters.reset_at
                END,
                updated_at = NOW()
            RETURNING count
            "#,
        )
        .bind(account_id)
        .bind(next_reset(now))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    /// Upsert that applies the lazy monthly reset without ever incrementing.
    async fn touch_counter(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, AppError> {
        let counter = sqlx::query_as::<_, UsageCounter>(
            r#"
            INSERT INTO usage_counters (account_id, count, reset_at, updated_at)
            VALUES ($1, 0, $2, NOW())
            ON CONFLICT (account_id) DO UPDATE SET
                count = CASE
                    WHEN usage_counters.reset_at <= $3 THEN 0
                    ELSE usage_counters.count
                END,
                reset_at = CASE
                    WHEN usage_counters.reset_at <= $3 THEN $2
                    ELSE usage_counters.reset_at
                END,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(next_reset(now))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(counter)
    }

    /// The tier is read fresh on every check so a reconciled upgrade applies
    /// to the existing counter immediately. Anything but a literal ACTIVE
    /// status quotes the free allowance.
    async fn effective_tier(&self, account_id: &str) -> Result<Tier, AppError> {
        let row = sqlx::query("SELECT tier, status FROM subscription_records WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        let tier = match row {
            None => Tier::Free,
            Some(row) => {
                let tier: String = row.get("tier");
                let status: String = row.get("status");
                if SubscriptionStatus::from_provider(&status).is_active() {
                    Tier::parse(&tier).unwrap_or(Tier::Free)
                } else {
                    Tier::Free
                }
            }
        };
        Ok(tier)
    }
}

fn monthly_limit(tier: Tier) -> Option<i64> {
    match tier {
        Tier::Free => Some(*config::QUOTA_FREE_MONTHLY_LIMIT),
        Tier::Basis => Some(*config::QUOTA_BASIS_MONTHLY_LIMIT),
        Tier::Pro => *config::QUOTA_PRO_MONTHLY_LIMIT,
    }
}

/// Next calendar-month boundary after `now` (UTC midnight on the 1st).
fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Utc.from_utc_datetime(&month_start) + Months::new(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_reset_is_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 13, 40, 0).unwrap();
        let reset = next_reset(now);
        assert!(reset > now);
        assert_eq!(reset, Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn next_reset_rolls_over_the_year() {
        let now = Utc.with_ymd_and_hms(2026, 12, 15, 8, 0, 0).unwrap();
        assert_eq!(
            next_reset(now),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_reset_at_the_boundary_advances_a_full_month() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(
            next_reset(now),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
        );
    }
}
