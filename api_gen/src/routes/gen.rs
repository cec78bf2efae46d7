use actix_web::{Responder, get, post, web};

use common::{error::Res, http::Success, jwt::JwtClaims};
use gen_ai::ContentGenerator;
use ledger::{LedgerStore, PlanPolicy};

use crate::dtos::r#gen::GenerateRequest;
use crate::services;

const HISTORY_LIMIT: i64 = 50;

/// Repurposes the submitted text into the four derived formats.
///
/// Consumes one unit of the caller's monthly quota before the
/// generation call; an exhausted quota answers 429 with an upgrade
/// hint and a failed generation refunds the unit.
#[post("")]
async fn post_generate(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<GenerateRequest>,
    store: web::Data<dyn LedgerStore>,
    generator: web::Data<dyn ContentGenerator>,
    policy: web::Data<PlanPolicy>,
) -> Res<impl Responder> {
    let response = services::r#gen::run_generation(
        store.get_ref(),
        generator.get_ref(),
        policy.get_ref(),
        claims.user_id,
        &req.text,
    )
    .await?;

    Success::ok(response)
}

/// Lists the caller's recent generations, newest first.
#[get("/history")]
async fn get_history(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<dyn LedgerStore>,
) -> Res<impl Responder> {
    let entries =
        services::r#gen::generation_history(store.get_ref(), claims.user_id, HISTORY_LIMIT).await?;
    Success::ok(entries)
}
