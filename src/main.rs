mod auth;
mod cache;
mod db;
mod error;
mod handlers;
mod models;
mod tasks;
mod voting;

use actix_cors::Cors;
use actix_web::{
    web::{scope, Data},
    App, HttpResponse, HttpServer,
};
use cache::{InMemoryTallyCache, TallyCache};
use db::Database;
use log::{error, info};
use std::env;
use std::sync::Arc;

#[actix_web::get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let database = match Database::new().await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let cache: Arc<dyn TallyCache> = Arc::new(InMemoryTallyCache::new());

    // Background sweep for the OPEN -> EXPIRED transition.
    tokio::spawn(tasks::poll_expirer::check_expired_polls_task(
        Arc::clone(&database),
        Arc::clone(&cache),
    ));

    let db_data = Data::from(database);
    let cache_data = Data::from(cache);

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    info!("Listening on {}", bind_addr);

    HttpServer::new(move || {
        // Lock CORS down to the configured frontend origin when one is set.
        let cors = match env::var("CORS_ORIGIN") {
            Ok(origin) => Cors::default()
                .allowed_origin(&origin)
                .allow_any_method()
                .allow_any_header(),
            Err(_) => Cors::permissive(),
        };

        App::new()
            .wrap(cors)
            .app_data(db_data.clone())
            .app_data(cache_data.clone())
            .service(health)
            .service(scope("/polls").configure(handlers::init))
            .service(scope("/hangouts").configure(handlers::init_hangouts))
    })
    .bind(bind_addr)?
    .run()
    .await
}
