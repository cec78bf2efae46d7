use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::PlanId;

/// Sentinel quota limit meaning "no cap".
pub const UNLIMITED: i64 = -1;

/// Lifecycle of a subscription as tracked locally. `None` is the state
/// before any checkout; `Canceled` is terminal until a new checkout
/// restarts the cycle at `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// Maps the payment provider's status vocabulary onto the local
    /// states. The provider's word is the source of truth; anything
    /// unrecognized returns `None` and the caller leaves the stored
    /// status untouched.
    pub fn from_provider(value: &str) -> Option<Self> {
        match value {
            "active" | "trialing" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" | "cancelled" => Some(SubscriptionStatus::Canceled),
            "none" => Some(SubscriptionStatus::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

/// Per-user record of plan, quota and subscription state. Exactly one
/// exists per user; it is created with free-plan defaults and only ever
/// reset, never deleted.
///
/// `version` is the optimistic-concurrency token: every committed
/// mutation must carry the version it loaded, and the store rejects the
/// write when the row has moved on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub plan: PlanId,
    pub quota_limit: i64,
    pub quota_used: i64,
    pub status: SubscriptionStatus,
    pub subscription_ref: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub version: i64,
}

impl Entitlement {
    /// Fresh free-plan entitlement with a billing period opening now.
    pub fn free_default(user_id: Uuid, free_limit: i64, now: DateTime<Utc>) -> Self {
        Entitlement {
            user_id,
            plan: PlanId::Free,
            quota_limit: free_limit,
            quota_used: 0,
            status: SubscriptionStatus::None,
            subscription_ref: None,
            period_start: now,
            period_end: add_one_month(now),
            version: 0,
        }
    }

    /// Generations left in the current period, `None` when unlimited.
    pub fn remaining(&self) -> Option<i64> {
        if self.quota_limit == UNLIMITED {
            None
        } else {
            Some((self.quota_limit - self.quota_used).max(0))
        }
    }
}

fn add_one_month(at: DateTime<Utc>) -> DateTime<Utc> {
    at.checked_add_months(Months::new(1))
        .unwrap_or(at + chrono::Duration::days(30))
}

/// Lazy period rollover. Returns the advanced entitlement when the
/// current period has elapsed, `None` otherwise; callers persist the
/// result inside the same commit as whatever read triggered it, so two
/// racing requests cannot both apply the reset.
///
/// Advances whole calendar months until the new window contains `now`,
/// which also covers an entitlement that sat untouched for several
/// periods.
pub fn rollover_if_due(entitlement: &Entitlement, now: DateTime<Utc>) -> Option<Entitlement> {
    if now < entitlement.period_end {
        return None;
    }

    let mut next = entitlement.clone();
    next.quota_used = 0;
    while now >= next.period_end {
        next.period_start = next.period_end;
        next.period_end = add_one_month(next.period_end);
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entitlement_at(start: DateTime<Utc>, used: i64) -> Entitlement {
        let mut ent = Entitlement::free_default(Uuid::new_v4(), 20, start);
        ent.quota_used = used;
        ent
    }

    #[test]
    fn not_due_within_period() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let ent = entitlement_at(start, 7);
        let mid = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        assert!(rollover_if_due(&ent, mid).is_none());
    }

    #[test]
    fn resets_usage_and_advances_period() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let ent = entitlement_at(start, 19);
        let later = Utc.with_ymd_and_hms(2025, 4, 2, 0, 0, 0).unwrap();

        let next = rollover_if_due(&ent, later).unwrap();
        assert_eq!(next.quota_used, 0);
        assert_eq!(
            next.period_start,
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            next.period_end,
            Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn skips_multiple_elapsed_periods() {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let ent = entitlement_at(start, 3);
        let much_later = Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap();

        let next = rollover_if_due(&ent, much_later).unwrap();
        assert!(next.period_start <= much_later && much_later < next.period_end);
        assert_eq!(next.quota_used, 0);
    }

    #[test]
    fn rollover_is_idempotent_within_new_period() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let ent = entitlement_at(start, 12);
        let later = Utc.with_ymd_and_hms(2025, 4, 5, 0, 0, 0).unwrap();

        let once = rollover_if_due(&ent, later).unwrap();
        assert!(rollover_if_due(&once, later).is_none());
    }

    #[test]
    fn provider_vocabulary_maps_verbatim() {
        assert_eq!(
            SubscriptionStatus::from_provider("active"),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            Some(SubscriptionStatus::PastDue)
        );
        assert_eq!(
            SubscriptionStatus::from_provider("canceled"),
            Some(SubscriptionStatus::Canceled)
        );
        assert_eq!(SubscriptionStatus::from_provider("incomplete"), None);
    }
}
