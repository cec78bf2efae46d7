use std::sync::Arc;

use actix_web::{Responder, post, web};

use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use ledger::{LedgerStore, PlanPolicy};

use crate::services;

/// Handles Stripe webhook events for the subscription lifecycle.
///
/// # Input
/// - `payload`: Raw string containing the webhook event data
/// - `req`: HTTP request containing Stripe signature in headers
/// - `config`: Application configuration with webhook secret
///
/// # Output
/// - Success: Returns 200 OK when the event is applied, a duplicate,
///   or references an unknown subscription (all acknowledged so Stripe
///   stops redelivering)
/// - Error: Returns 400 Bad Request for an invalid signature
///
/// # Note
/// This endpoint is not called from the frontend. Stripe's servers call
/// it when billing events occur; configure the URL in the Stripe
/// Dashboard under Webhooks and subscribe to checkout.session.completed,
/// customer.subscription.updated and customer.subscription.deleted.
#[post("/webhook")]
async fn post_webhook(
    payload: String,
    req: actix_web::HttpRequest,
    config: web::Data<Arc<Config>>,
    store: web::Data<dyn LedgerStore>,
    policy: web::Data<PlanPolicy>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };

    let event =
        services::webhook::construct_event(&payload, signature, &config.stripe.webhook_secret)?;
    let outcome =
        services::webhook::process_webhook_event(store.get_ref(), policy.get_ref(), event).await?;

    Success::ok(outcome)
}
