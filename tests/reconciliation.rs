use chrono::{Duration, TimeZone, Utc};
use sqlx::PgPool;

use entitlement_engine::billing::{
    BillingEvent, Reconciler, SubscriptionRecord, SubscriptionStatus, Tier,
};
use entitlement_engine::error::AppError;

// key: reconciliation-tests -> idempotence, ordering, downgrade paths

fn checkout(account: &str, tier: Tier, customer: &str, subscription: &str) -> BillingEvent {
    BillingEvent::CheckoutCompleted {
        event_id: format!("evt_checkout_{subscription}"),
        account_id: account.to_string(),
        tier,
        external_customer_id: customer.to_string(),
        external_subscription_id: subscription.to_string(),
        period_start: None,
        period_end: None,
    }
}

fn update(account: &str, status: &str, tier: Option<Tier>) -> BillingEvent {
    BillingEvent::SubscriptionUpdated {
        event_id: format!("evt_update_{account}_{status}"),
        account_id: account.to_string(),
        tier,
        status: SubscriptionStatus::from_provider(status),
        period_start: None,
        period_end: None,
    }
}

fn cancel(account: &str) -> BillingEvent {
    BillingEvent::SubscriptionCanceled {
        event_id: format!("evt_cancel_{account}"),
        account_id: account.to_string(),
        status: SubscriptionStatus::from_provider("canceled"),
    }
}

async fn load(pool: &PgPool, account: &str) -> SubscriptionRecord {
    sqlx::query_as("SELECT * FROM subscription_records WHERE account_id = $1")
        .bind(account)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn redelivered_checkout_yields_identical_record(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    let event = checkout("acct_1", Tier::Pro, "cus_1", "sub_1");
    let first = reconciler.apply(&event).await.unwrap().unwrap();
    let second = reconciler.apply(&event).await.unwrap().unwrap();

    assert_eq!(first.account_id, second.account_id);
    assert_eq!(first.tier, second.tier);
    assert_eq!(first.status, second.status);
    assert_eq!(first.external_customer_id, second.external_customer_id);
    assert_eq!(
        first.external_subscription_id,
        second.external_subscription_id
    );
    assert_eq!(second.tier, Tier::Pro);
    assert_eq!(second.status, SubscriptionStatus::Active);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscription_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1, "duplicate delivery must not split the record");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn overlapping_duplicate_checkouts_produce_one_record(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    // The processor retries on timeout, so two deliveries of the same event
    // can reconcile concurrently. The single-statement upsert must not split
    // the record or leave a partial write.
    let event = checkout("acct_1", Tier::Pro, "cus_1", "sub_1");
    let first = Reconciler::new(pool.clone());
    let second = Reconciler::new(pool.clone());
    let (a, b) = tokio::join!(first.apply(&event), second.apply(&event));
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscription_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let record = load(&pool, "acct_1").await;
    assert_eq!(record.tier, Tier::Pro);
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.external_subscription_id.as_deref(), Some("sub_1"));
    // Both deliveries carried no processor period, so whichever write landed
    // last set a full default window from its own clock.
    assert_eq!(
        record.current_period_end - record.current_period_start,
        Duration::days(30)
    );
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn last_delivered_event_wins(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    reconciler
        .apply(&checkout("acct_1", Tier::Pro, "cus_1", "sub_1"))
        .await
        .unwrap();
    reconciler.apply(&cancel("acct_1")).await.unwrap();
    // A stale retry of an earlier "active" update arriving after the
    // cancellation reactivates the record; ordering is last-write-wins.
    reconciler
        .apply(&update("acct_1", "active", None))
        .await
        .unwrap();

    let record = load(&pool, "acct_1").await;
    assert_eq!(record.status, SubscriptionStatus::Active);
    // Cancellation had already dropped the tier and the stale update carried
    // no tier of its own.
    assert_eq!(record.tier, Tier::Free);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn cancellation_downgrades_to_free(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    reconciler
        .apply(&checkout("acct_1", Tier::Basis, "cus_1", "sub_1"))
        .await
        .unwrap();
    reconciler.apply(&cancel("acct_1")).await.unwrap();

    let record = load(&pool, "acct_1").await;
    assert_eq!(record.tier, Tier::Free);
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    assert_eq!(record.external_subscription_id.as_deref(), Some("sub_1"));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_processor_status_is_stored_verbatim(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    reconciler
        .apply(&checkout("acct_1", Tier::Pro, "cus_1", "sub_1"))
        .await
        .unwrap();
    reconciler
        .apply(&update("acct_1", "incomplete_expired", None))
        .await
        .unwrap();

    let record = load(&pool, "acct_1").await;
    assert_eq!(record.tier, Tier::Free);
    assert_eq!(
        record.status,
        SubscriptionStatus::Other("INCOMPLETE_EXPIRED".to_string())
    );
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn update_for_unknown_account_is_reported(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    let err = reconciler
        .apply(&update("acct_missing", "active", Some(Tier::Pro)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscription_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn resubscribe_replaces_subscription_id_and_keeps_customer_id(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    reconciler
        .apply(&checkout("acct_1", Tier::Basis, "cus_1", "sub_1"))
        .await
        .unwrap();
    reconciler.apply(&cancel("acct_1")).await.unwrap();
    reconciler
        .apply(&checkout("acct_1", Tier::Pro, "cus_ignored", "sub_2"))
        .await
        .unwrap();

    let record = load(&pool, "acct_1").await;
    assert_eq!(record.external_customer_id.as_deref(), Some("cus_1"));
    assert_eq!(record.external_subscription_id.as_deref(), Some("sub_2"));
    assert_eq!(record.tier, Tier::Pro);
    assert_eq!(record.status, SubscriptionStatus::Active);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn active_update_overwrites_tier_and_period_when_present(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let reconciler = Reconciler::new(pool.clone());

    reconciler
        .apply(&checkout("acct_1", Tier::Basis, "cus_1", "sub_1"))
        .await
        .unwrap();

    let period_start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
    let period_end = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    reconciler
        .apply(&BillingEvent::SubscriptionUpdated {
            event_id: "evt_renewal".to_string(),
            account_id: "acct_1".to_string(),
            tier: Some(Tier::Pro),
            status: SubscriptionStatus::Active,
            period_start: Some(period_start),
            period_end: Some(period_end),
        })
        .await
        .unwrap();

    let record = load(&pool, "acct_1").await;
    assert_eq!(record.tier, Tier::Pro);
    assert_eq!(record.current_period_start, period_start);
    assert_eq!(record.current_period_end, period_end);
}
