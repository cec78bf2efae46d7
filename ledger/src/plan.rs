use serde::{Deserialize, Serialize};

/// Subscription plan tiers offered by the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Pro,
    Enterprise,
}

impl PlanId {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(PlanId::Free),
            "pro" => Some(PlanId::Pro),
            "enterprise" => Some(PlanId::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanId::Free => write!(f, "free"),
            PlanId::Pro => write!(f, "pro"),
            PlanId::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Monthly generation quota per plan. Supplied as configuration at
/// startup; -1 means unlimited.
#[derive(Debug, Clone, Copy)]
pub struct PlanPolicy {
    pub free: i64,
    pub pro: i64,
    pub enterprise: i64,
}

impl PlanPolicy {
    pub fn new(free: i64, pro: i64, enterprise: i64) -> Self {
        PlanPolicy {
            free,
            pro,
            enterprise,
        }
    }

    pub fn limit_for(&self, plan: PlanId) -> i64 {
        match plan {
            PlanId::Free => self.free,
            PlanId::Pro => self.pro,
            PlanId::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanPolicy {
    fn default() -> Self {
        PlanPolicy::new(20, crate::entitlement::UNLIMITED, crate::entitlement::UNLIMITED)
    }
}
