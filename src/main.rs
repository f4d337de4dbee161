use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod models;
mod openapi;
mod permissions;
mod rate_limit;
mod repo;
mod routes;
mod security;
mod synthesis;

use openapi::ApiDoc;
#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use repo::inmem::InMemRepo;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use routes::{config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment comes from the shell / systemd / Docker; .env only in debug
    // builds to reduce local setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping futurelog server");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse::<std::net::SocketAddr>() {
            Ok(sock) => {
                if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(sock)
                    .install()
                {
                    eprintln!("Failed to start Prometheus exporter on {addr}: {e}");
                    std::process::exit(1);
                }
                info!("Prometheus exporter listening on {addr}");
            }
            Err(e) => {
                eprintln!("Invalid METRICS_ADDR '{addr}': {e}");
                std::process::exit(1);
            }
        }
    }

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = match std::env::var("DATABASE_URL") {
            Ok(v) => v,
            Err(_) => {
                eprintln!("DATABASE_URL must be set for postgres-store");
                std::process::exit(1);
            }
        };
        let pool = match PgPoolOptions::new().max_connections(5).connect_lazy(&db_url) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to create Pg pool: {e}");
                std::process::exit(1);
            }
        };
        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            eprintln!("Migration failure: {e}");
            std::process::exit(1);
        }
        info!("Using Postgres repository backend");
        crate::repo::pg::PgRepo::new(pool)
    };

    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env());
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontend ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                limiter: limiter.clone(),
            }))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080 (all interfaces)");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let required = vec!["JWT_SECRET"];

    let mut missing = Vec::new();
    for var in required {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }
}
