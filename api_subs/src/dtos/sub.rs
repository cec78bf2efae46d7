use chrono::{DateTime, Utc};
use ledger::{Entitlement, PlanId, SubscriptionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted checkout page the frontend redirects to.
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub plan: PlanId,
    pub status: SubscriptionStatus,
    pub quota_used: i64,
    pub quota_limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
    pub period_end: DateTime<Utc>,
}

impl From<&Entitlement> for EntitlementResponse {
    fn from(ent: &Entitlement) -> Self {
        EntitlementResponse {
            plan: ent.plan,
            status: ent.status,
            quota_used: ent.quota_used,
            quota_limit: ent.quota_limit,
            remaining: ent.remaining(),
            period_end: ent.period_end,
        }
    }
}
