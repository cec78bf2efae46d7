use chrono::{DateTime, Utc};

use crate::entitlement::{Entitlement, SubscriptionStatus};
use crate::error::LedgerError;
use crate::event::{BillingEvent, BillingEventKind, BillingPeriod};
use crate::plan::{PlanId, PlanPolicy};
use crate::quota::{MAX_COMMIT_ATTEMPTS, commit_backoff};
use crate::store::{Commit, LedgerStore};

/// How a billing event landed. All three are acknowledged to the event
/// source; redelivery after any of them is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    /// Event id already processed; state untouched.
    Duplicate,
    /// The referenced subscription maps to no known entitlement. Logged
    /// as a reconciliation anomaly, never fatal.
    Unmatched,
}

/// Applies one provider event to the entitlement it concerns.
///
/// Events are applied in receipt order; out-of-order delivery is
/// last-applied-wins, which is an accepted limitation since the
/// provider supplies no ordering token. The processed-event insert and
/// the entitlement write share one transaction, so a crash can never
/// leave an event half-applied or applied-but-unrecorded.
pub async fn apply_event(
    store: &dyn LedgerStore,
    policy: &PlanPolicy,
    event: &BillingEvent,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, LedgerError> {
    if store.seen_event(&event.event_id).await? {
        log::debug!("billing event {} already processed", event.event_id);
        return Ok(ReconcileOutcome::Duplicate);
    }

    for attempt in 0..MAX_COMMIT_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(commit_backoff(attempt)).await;
        }

        let (next, outcome) = match &event.kind {
            BillingEventKind::CheckoutCompleted {
                user_id,
                plan,
                subscription_ref,
                period,
            } => {
                if *plan == PlanId::Free {
                    // an active subscription on the free plan would be
                    // contradictory; ack and move on
                    log::warn!(
                        "checkout event {} names the free plan, ignoring",
                        event.event_id
                    );
                    (None, ReconcileOutcome::Applied)
                } else {
                    let mut entitlement = match store.load_entitlement(*user_id).await? {
                        Some(entitlement) => entitlement,
                        None => Entitlement::free_default(
                            *user_id,
                            policy.limit_for(PlanId::Free),
                            now,
                        ),
                    };
                    entitlement.plan = *plan;
                    entitlement.status = SubscriptionStatus::Active;
                    entitlement.subscription_ref = Some(subscription_ref.clone());
                    entitlement.quota_limit = policy.limit_for(*plan);
                    if let Some(BillingPeriod { start, end }) = period {
                        entitlement.period_start = *start;
                        entitlement.period_end = *end;
                    }
                    (Some(entitlement), ReconcileOutcome::Applied)
                }
            }

            BillingEventKind::SubscriptionUpdated {
                subscription_ref,
                status,
                period,
            } => match store.find_by_subscription_ref(subscription_ref).await? {
                Some(mut entitlement) => {
                    match SubscriptionStatus::from_provider(status) {
                        Some(parsed) => entitlement.status = parsed,
                        None => log::warn!(
                            "event {}: unrecognized provider status '{}', keeping '{}'",
                            event.event_id,
                            status,
                            entitlement.status.as_str()
                        ),
                    }
                    if let Some(BillingPeriod { start, end }) = period {
                        entitlement.period_start = *start;
                        entitlement.period_end = *end;
                    }
                    (Some(entitlement), ReconcileOutcome::Applied)
                }
                None => {
                    log::warn!(
                        "event {}: no entitlement for subscription {}",
                        event.event_id,
                        subscription_ref
                    );
                    (None, ReconcileOutcome::Unmatched)
                }
            },

            BillingEventKind::SubscriptionCanceled { subscription_ref } => {
                match store.find_by_subscription_ref(subscription_ref).await? {
                    Some(mut entitlement) => {
                        entitlement.status = SubscriptionStatus::Canceled;
                        entitlement.plan = PlanId::Free;
                        entitlement.quota_limit = policy.limit_for(PlanId::Free);
                        (Some(entitlement), ReconcileOutcome::Applied)
                    }
                    None => {
                        log::warn!(
                            "event {}: no entitlement for subscription {}",
                            event.event_id,
                            subscription_ref
                        );
                        (None, ReconcileOutcome::Unmatched)
                    }
                }
            }
        };

        match store
            .commit_reconciliation(&event.event_id, next.as_ref())
            .await?
        {
            Commit::Applied => return Ok(outcome),
            Commit::Duplicate => return Ok(ReconcileOutcome::Duplicate),
            Commit::Conflict => continue,
        }
    }

    Err(LedgerError::Contention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap()
    }

    fn checkout(event_id: &str, user_id: Uuid, plan: PlanId, sub_ref: &str) -> BillingEvent {
        BillingEvent {
            event_id: event_id.to_string(),
            kind: BillingEventKind::CheckoutCompleted {
                user_id,
                plan,
                subscription_ref: sub_ref.to_string(),
                period: None,
            },
        }
    }

    #[tokio::test]
    async fn checkout_upgrades_to_pro() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();
        let user_id = Uuid::new_v4();
        store
            .create_entitlement(&Entitlement::free_default(user_id, 20, now()))
            .await
            .unwrap();

        let outcome = apply_event(
            &store,
            &policy,
            &checkout("evt_1", user_id, PlanId::Pro, "sub_1"),
            now(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.plan, PlanId::Pro);
        assert_eq!(ent.quota_limit, -1);
        assert_eq!(ent.status, SubscriptionStatus::Active);
        assert_eq!(ent.subscription_ref.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn checkout_upserts_missing_entitlement() {
        let store = MemoryLedger::new();
        let user_id = Uuid::new_v4();

        let outcome = apply_event(
            &store,
            &PlanPolicy::default(),
            &checkout("evt_1", user_id, PlanId::Enterprise, "sub_9"),
            now(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.plan, PlanId::Enterprise);
        assert_eq!(ent.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn redelivery_is_a_noop() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();
        let user_id = Uuid::new_v4();

        let event = checkout("evt_dup", user_id, PlanId::Pro, "sub_1");
        assert_eq!(
            apply_event(&store, &policy, &event, now()).await.unwrap(),
            ReconcileOutcome::Applied
        );
        let after_first = store.load_entitlement(user_id).await.unwrap().unwrap();

        for _ in 0..3 {
            assert_eq!(
                apply_event(&store, &policy, &event, now()).await.unwrap(),
                ReconcileOutcome::Duplicate
            );
        }
        let after_retries = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(after_first, after_retries);
    }

    #[tokio::test]
    async fn cancellation_resets_to_free() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();
        let user_id = Uuid::new_v4();
        apply_event(
            &store,
            &policy,
            &checkout("evt_1", user_id, PlanId::Pro, "sub_1"),
            now(),
        )
        .await
        .unwrap();

        let cancel = BillingEvent {
            event_id: "evt_2".to_string(),
            kind: BillingEventKind::SubscriptionCanceled {
                subscription_ref: "sub_1".to_string(),
            },
        };
        assert_eq!(
            apply_event(&store, &policy, &cancel, now()).await.unwrap(),
            ReconcileOutcome::Applied
        );

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.plan, PlanId::Free);
        assert_eq!(ent.quota_limit, 20);
        assert_eq!(ent.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn update_applies_provider_status_by_ref() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();
        let user_id = Uuid::new_v4();
        apply_event(
            &store,
            &policy,
            &checkout("evt_1", user_id, PlanId::Pro, "sub_1"),
            now(),
        )
        .await
        .unwrap();

        let start = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let update = BillingEvent {
            event_id: "evt_2".to_string(),
            kind: BillingEventKind::SubscriptionUpdated {
                subscription_ref: "sub_1".to_string(),
                status: "past_due".to_string(),
                period: Some(BillingPeriod { start, end }),
            },
        };
        apply_event(&store, &policy, &update, now()).await.unwrap();

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.status, SubscriptionStatus::PastDue);
        assert_eq!(ent.period_start, start);
        assert_eq!(ent.period_end, end);
        // plan and limit are not touched by status updates
        assert_eq!(ent.plan, PlanId::Pro);
    }

    #[tokio::test]
    async fn unknown_provider_status_keeps_local_state() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();
        let user_id = Uuid::new_v4();
        apply_event(
            &store,
            &policy,
            &checkout("evt_1", user_id, PlanId::Pro, "sub_1"),
            now(),
        )
        .await
        .unwrap();

        let update = BillingEvent {
            event_id: "evt_2".to_string(),
            kind: BillingEventKind::SubscriptionUpdated {
                subscription_ref: "sub_1".to_string(),
                status: "incomplete_expired".to_string(),
                period: None,
            },
        };
        assert_eq!(
            apply_event(&store, &policy, &update, now()).await.unwrap(),
            ReconcileOutcome::Applied
        );

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn unmatched_ref_is_acked_and_recorded() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();

        let update = BillingEvent {
            event_id: "evt_ghost".to_string(),
            kind: BillingEventKind::SubscriptionUpdated {
                subscription_ref: "sub_unknown".to_string(),
                status: "active".to_string(),
                period: None,
            },
        };
        assert_eq!(
            apply_event(&store, &policy, &update, now()).await.unwrap(),
            ReconcileOutcome::Unmatched
        );
        // the event id is still recorded, so redelivery short-circuits
        assert_eq!(
            apply_event(&store, &policy, &update, now()).await.unwrap(),
            ReconcileOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn free_plan_checkout_is_ignored() {
        let store = MemoryLedger::new();
        let policy = PlanPolicy::default();
        let user_id = Uuid::new_v4();

        let outcome = apply_event(
            &store,
            &policy,
            &checkout("evt_free", user_id, PlanId::Free, "sub_free"),
            now(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert!(store.load_entitlement(user_id).await.unwrap().is_none());
    }
}
