mod cors;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use common::env_config::Config;
use gen_ai::{ContentGenerator, GeminiClient};
use ledger::{LedgerStore, PlanPolicy};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    // get info
    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    let store: Arc<dyn LedgerStore> = Arc::new(db::PgLedger::new(pool));
    let generator: Arc<dyn ContentGenerator> = Arc::new(GeminiClient::new(&config.gemini));
    let policy = PlanPolicy::new(
        config.plan_quotas.free,
        config.plan_quotas.pro,
        config.plan_quotas.enterprise,
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::from(store.clone()))
            .app_data(web::Data::from(generator.clone()))
            .app_data(web::Data::new(policy.clone()))
            .wrap(logger::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(api_subs::mount_webhook())
                    .service(
                        web::scope("/dashboard")
                            .wrap(extractor::middleware())
                            .service(api_gen::mount_gen())
                            .service(api_subs::mount_subs()),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
