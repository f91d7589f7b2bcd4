use axum::{
    extract::{Extension, Path},
    Json,
};
use sqlx::PgPool;

use super::models::SubscriptionRecord;
use super::quota::{QuotaDecision, QuotaEnforcer};
use crate::error::AppResult;

/// key: billing-api -> read-only rest surface
pub async fn get_subscription(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<String>,
) -> AppResult<Json<Option<SubscriptionRecord>>> {
    let record = sqlx::query_as::<_, SubscriptionRecord>(
        "SELECT * FROM subscription_records WHERE account_id = $1",
    )
    .bind(&account_id)
    .fetch_optional(&pool)
    .await?;

    Ok(Json(record))
}

/// The read phase of the quota protocol. Commit stays a library call made by
/// the metered action itself after it succeeds.
pub async fn check_quota(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<String>,
) -> AppResult<Json<QuotaDecision>> {
    let decision = QuotaEnforcer::new(pool).check(&account_id).await?;
    Ok(Json(decision))
}
