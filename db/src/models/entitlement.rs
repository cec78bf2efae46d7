use chrono::{DateTime, Utc};
use ledger::{Entitlement, PlanId, StoreError, SubscriptionStatus};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntitlementRow {
    pub user_id: Uuid,
    pub plan: String,
    pub quota_limit: i64,
    pub quota_used: i64,
    pub status: String,
    pub subscription_ref: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub version: i64,
}

impl EntitlementRow {
    pub fn into_domain(self) -> Result<Entitlement, StoreError> {
        let plan = PlanId::parse(&self.plan).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown plan '{}' on row {}", self.plan, self.user_id))
        })?;
        let status = SubscriptionStatus::from_provider(&self.status).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "unknown status '{}' on row {}",
                self.status, self.user_id
            ))
        })?;
        Ok(Entitlement {
            user_id: self.user_id,
            plan,
            quota_limit: self.quota_limit,
            quota_used: self.quota_used,
            status,
            subscription_ref: self.subscription_ref,
            period_start: self.period_start,
            period_end: self.period_end,
            version: self.version,
        })
    }
}
