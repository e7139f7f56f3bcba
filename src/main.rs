use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use road_assist_geo::config::{LoggingSettings, Settings};
use road_assist_geo::routes::{self, AppState};
use road_assist_geo::services::{build_cache, PostgresProviderStore, ProviderStore};
use road_assist_geo::MatchingEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// LOG_LEVEL and LOG_FORMAT take precedence over the logging settings.
fn init_tracing(logging: &LoggingSettings) {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_tracing(&settings.logging);

    info!("Starting Nearest Provider Service...");

    // The only startup failure that stops the process
    let store: Arc<dyn ProviderStore> = match PostgresProviderStore::from_settings(&settings.database).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to create database connection pool: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    info!(
        "Database connection pool created (max: {} connections, {} acquisition attempts)",
        settings.database.max_connections, settings.database.retry_attempts
    );

    let cache = build_cache(&settings.cache).await;

    let engine = MatchingEngine::new(store.clone(), cache.clone())
        .with_cache_ttl(Duration::from_secs(settings.cache.ttl_secs.max(1)));

    info!("Matching engine initialized (result TTL: {:?})", engine.cache_ttl());

    let app_state = AppState {
        engine,
        store,
        cache,
        matching: settings.matching.clone(),
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.max(1);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(routes::json_config())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
