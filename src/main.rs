mod api;
mod auth;
mod models;
mod pagination;
mod search;
mod store;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use std::sync::Arc;

use api::AppState;
use auth::{AuthService, RequireAuth};
use store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    // Get configuration from environment
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a number");

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "codifeed.db".to_string());

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET not set, using default (not secure for production!)");
        "default_jwt_secret_change_me".to_string()
    });

    // Initialize store
    let store = Arc::new(Store::new(&db_path).expect("Failed to initialize database"));

    // Initialize auth service
    let auth_service = Arc::new(AuthService::new(jwt_secret));

    log::info!("Database: {}", db_path);
    log::info!("Starting codifeed server on port {}", port);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .wrap(RequireAuth::new(auth_service.clone()))
            .app_data(web::Data::new(AppState {
                store: store.clone(),
                auth_service: auth_service.clone(),
            }))
            .configure(api::configure_routes)
    });

    server.bind(("0.0.0.0", port))?.run().await
}
