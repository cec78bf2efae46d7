use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::plan::PlanId;

/// Billing period bounds carried on a provider event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A payment-provider webhook event reduced to what the reconciler
/// needs. Transport concerns (signature verification, payload shape)
/// stay with the caller; by the time one of these exists the event is
/// trusted.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    /// Provider-assigned unique event id, the deduplication key.
    pub event_id: String,
    pub kind: BillingEventKind,
}

#[derive(Debug, Clone)]
pub enum BillingEventKind {
    /// Checkout finished; the user now holds the named plan.
    CheckoutCompleted {
        user_id: Uuid,
        plan: PlanId,
        subscription_ref: String,
        period: Option<BillingPeriod>,
    },
    /// Provider-side status change, keyed by the provider's
    /// subscription id rather than the user.
    SubscriptionUpdated {
        subscription_ref: String,
        status: String,
        period: Option<BillingPeriod>,
    },
    /// Subscription ended at the provider.
    SubscriptionCanceled { subscription_ref: String },
}
