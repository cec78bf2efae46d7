use chrono::{TimeZone, Utc};
use stripe::{Event, EventObject, EventType, Webhook};

use common::error::{AppError, Res};
use ledger::{
    BillingEvent, BillingEventKind, BillingPeriod, LedgerStore, PlanId, PlanPolicy,
    ReconcileOutcome, apply_event,
};

use super::checkout::{META_PLAN_ID, META_USER_ID};

/// Creates an event for the webhook based on the request payload and signature.
/// Requires a webhook secret key.
pub(crate) fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => Ok(event),
        Err(e) => {
            log::error!("Error constructing webhook event: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}

fn period_from_timestamps(start: i64, end: i64) -> Option<BillingPeriod> {
    let start = Utc.timestamp_opt(start, 0).single()?;
    let end = Utc.timestamp_opt(end, 0).single()?;
    Some(BillingPeriod { start, end })
}

/// Reduces a verified Stripe event to the reconciler's vocabulary.
/// `None` means the event type carries nothing for the ledger, or its
/// payload is malformed in a way that only warrants an anomaly log;
/// both are acknowledged upstream either way.
fn to_billing_event(event: &Event) -> Option<BillingEvent> {
    let event_id = event.id.to_string();

    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            let EventObject::CheckoutSession(session) = &event.data.object else {
                return None;
            };
            let metadata = session.metadata.as_ref()?;
            let user_id = metadata
                .get(META_USER_ID)
                .and_then(|v| v.parse().ok())
                .or_else(|| {
                    log::error!("checkout event {event_id} has no usable user id metadata");
                    None
                })?;
            let plan = metadata
                .get(META_PLAN_ID)
                .and_then(|v| PlanId::parse(v))
                .or_else(|| {
                    log::error!("checkout event {event_id} has no usable plan metadata");
                    None
                })?;
            let subscription_ref = session
                .subscription
                .as_ref()
                .map(|s| s.id().to_string())
                .or_else(|| {
                    log::error!("checkout event {event_id} carries no subscription");
                    None
                })?;

            Some(BillingEvent {
                event_id,
                kind: BillingEventKind::CheckoutCompleted {
                    user_id,
                    plan,
                    subscription_ref,
                    period: None,
                },
            })
        }

        EventType::CustomerSubscriptionUpdated => {
            let EventObject::Subscription(subscription) = &event.data.object else {
                return None;
            };
            Some(BillingEvent {
                event_id,
                kind: BillingEventKind::SubscriptionUpdated {
                    subscription_ref: subscription.id.to_string(),
                    status: subscription.status.to_string(),
                    period: period_from_timestamps(
                        subscription.current_period_start,
                        subscription.current_period_end,
                    ),
                },
            })
        }

        EventType::CustomerSubscriptionDeleted => {
            let EventObject::Subscription(subscription) = &event.data.object else {
                return None;
            };
            Some(BillingEvent {
                event_id,
                kind: BillingEventKind::SubscriptionCanceled {
                    subscription_ref: subscription.id.to_string(),
                },
            })
        }

        _ => {
            log::info!("Unhandled event type: {}", event.type_);
            None
        }
    }
}

/// Applies a verified webhook event through the reconciler. Duplicates
/// and unmatched subscription refs are acknowledged successes; the
/// event source must not redeliver them.
pub(crate) async fn process_webhook_event(
    store: &dyn LedgerStore,
    policy: &PlanPolicy,
    event: Event,
) -> Res<&'static str> {
    log::info!("Processing webhook event: {}", event.type_);

    let Some(billing_event) = to_billing_event(&event) else {
        return Ok("ignored");
    };

    match apply_event(store, policy, &billing_event, Utc::now()).await? {
        ReconcileOutcome::Applied => Ok("processed"),
        ReconcileOutcome::Duplicate => Ok("duplicate"),
        ReconcileOutcome::Unmatched => Ok("unmatched"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_become_utc_bounds() {
        let period = period_from_timestamps(1_746_057_600, 1_748_736_000).unwrap();
        assert_eq!(period.start, Utc.timestamp_opt(1_746_057_600, 0).unwrap());
        assert_eq!(period.end, Utc.timestamp_opt(1_748_736_000, 0).unwrap());
        assert!(period.start < period.end);
    }
}
