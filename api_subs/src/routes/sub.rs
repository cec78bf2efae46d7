use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use chrono::Utc;

use common::{env_config::Config, error::Res, http::Success, jwt::JwtClaims};
use ledger::{Entitlement, LedgerStore, PlanId, PlanPolicy, rollover_if_due};

use crate::dtos::sub::{CheckoutRequest, EntitlementResponse};
use crate::services;

/// Starts a checkout for one of the paid plans and returns the hosted
/// checkout URL. The entitlement itself only changes when the
/// completion webhook arrives.
#[post("/checkout")]
async fn post_checkout(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<CheckoutRequest>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let client = stripe::Client::new(config.stripe.secret_key.clone());

    let response = services::checkout::create_checkout_session(
        &client,
        &config.stripe,
        &claims,
        req.into_inner(),
    )
    .await?;

    Success::ok(response)
}

/// The caller's current plan, subscription status and quota usage.
#[get("/current")]
async fn get_current(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<dyn LedgerStore>,
    policy: web::Data<PlanPolicy>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let mut entitlement = match store.load_entitlement(claims.user_id).await? {
        Some(entitlement) => entitlement,
        // nothing persisted yet; present the free defaults
        None => Entitlement::free_default(claims.user_id, policy.limit_for(PlanId::Free), now),
    };

    // display-only rollover; the quota enforcer persists the real one
    if let Some(next) = rollover_if_due(&entitlement, now) {
        entitlement = next;
    }

    Success::ok(EntitlementResponse::from(&entitlement))
}
