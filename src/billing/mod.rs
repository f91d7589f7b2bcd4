pub mod api;
pub mod events;
pub mod models;
pub mod quota;
pub mod reconciler;

pub use events::{decode_event, verify_signature, SIGNATURE_HEADER};
pub use models::{BillingEvent, SubscriptionRecord, SubscriptionStatus, Tier, UsageCounter};
pub use quota::{QuotaDecision, QuotaEnforcer};
pub use reconciler::Reconciler;
