use std::collections::HashMap;

use stripe::{CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession};

use common::{
    env_config::StripeConfig,
    error::{AppError, Res},
    jwt::JwtClaims,
};
use ledger::PlanId;

use crate::dtos::sub::{CheckoutRequest, CheckoutResponse};

/// Metadata keys the webhook reads back off the completed session.
pub(crate) const META_USER_ID: &str = "user_id";
pub(crate) const META_PLAN_ID: &str = "plan_id";

pub(crate) fn price_for(config: &StripeConfig, plan: PlanId) -> Res<&str> {
    match plan {
        PlanId::Free => Err(AppError::BadRequest(
            "The free plan does not require checkout".to_string(),
        )),
        PlanId::Pro => Ok(&config.pro_price_id),
        PlanId::Enterprise => Ok(&config.enterprise_price_id),
    }
}

/// Creates a subscription-mode checkout session for the caller. The
/// user id and plan ride in the session metadata so the completion
/// webhook can credit the right entitlement.
pub(crate) async fn create_checkout_session(
    client: &Client,
    config: &StripeConfig,
    claims: &JwtClaims,
    req: CheckoutRequest,
) -> Res<CheckoutResponse> {
    let plan = PlanId::parse(&req.plan_id)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid plan '{}'", req.plan_id)))?;
    let price_id = price_for(config, plan)?.to_string();

    let mut metadata = HashMap::new();
    metadata.insert(META_USER_ID.to_string(), claims.user_id.to_string());
    metadata.insert(META_PLAN_ID.to_string(), plan.to_string());

    let params = CreateCheckoutSession {
        payment_method_types: Some(vec![stripe::CreateCheckoutSessionPaymentMethodTypes::Card]),
        line_items: Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]),
        mode: Some(CheckoutSessionMode::Subscription),
        success_url: Some(req.success_url.as_str()),
        cancel_url: Some(req.cancel_url.as_str()),
        customer_email: Some(claims.email.as_str()),
        metadata: Some(metadata),
        ..Default::default()
    };

    let session = CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)?;

    Ok(CheckoutResponse {
        url: session.url.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            pro_price_id: "price_pro_monthly".to_string(),
            enterprise_price_id: "price_enterprise_monthly".to_string(),
        }
    }

    #[test]
    fn paid_plans_map_to_configured_prices() {
        let config = config();
        assert_eq!(price_for(&config, PlanId::Pro).unwrap(), "price_pro_monthly");
        assert_eq!(
            price_for(&config, PlanId::Enterprise).unwrap(),
            "price_enterprise_monthly"
        );
    }

    #[test]
    fn free_plan_is_not_purchasable() {
        assert!(matches!(
            price_for(&config(), PlanId::Free),
            Err(AppError::BadRequest(_))
        ));
    }
}
