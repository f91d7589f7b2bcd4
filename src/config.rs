use once_cell::sync::Lazy;

/// Shared secret for billing event signatures. Must be set via the
/// `BILLING_WEBHOOK_SECRET` env variable.
pub static BILLING_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_WEBHOOK_SECRET").expect("BILLING_WEBHOOK_SECRET must be set")
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even
/// if database migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// key: quota-config -> monthly allowance on the free tier
pub static QUOTA_FREE_MONTHLY_LIMIT: Lazy<i64> = Lazy::new(|| {
    std::env::var("QUOTA_FREE_MONTHLY_LIMIT")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
        .unwrap_or(5)
});

/// key: quota-config -> monthly allowance on the BASIS tier
pub static QUOTA_BASIS_MONTHLY_LIMIT: Lazy<i64> = Lazy::new(|| {
    std::env::var("QUOTA_BASIS_MONTHLY_LIMIT")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
        .unwrap_or(100)
});

/// key: quota-config -> monthly allowance on the PRO tier; unset means unlimited
pub static QUOTA_PRO_MONTHLY_LIMIT: Lazy<Option<i64>> = Lazy::new(|| {
    std::env::var("QUOTA_PRO_MONTHLY_LIMIT")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
});

/// key: billing-config -> fallback period length for checkouts that arrive
/// without processor-supplied bounds
pub static CHECKOUT_PERIOD_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("CHECKOUT_PERIOD_DAYS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(30)
});
