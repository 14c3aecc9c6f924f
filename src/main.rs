mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Json, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{auth::JwtVerifier, queue::ImportQueue, status::StatusStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing book-import server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("import_jobs_total", "Total import jobs submitted");
    metrics::describe_counter!(
        "import_jobs_completed",
        "Total import jobs that reached COMPLETED or COMPLETED_WITH_ERRORS"
    );
    metrics::describe_counter!("import_jobs_failed", "Total import jobs that failed");
    metrics::describe_histogram!(
        "import_processing_seconds",
        "Time to process one import job"
    );
    metrics::describe_gauge!(
        "import_queue_depth",
        "Current number of pending jobs in the import queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis-backed status store and job queue
    tracing::info!("Connecting to Redis");
    let redis_client =
        redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    let status = StatusStore::new(redis_client.clone());
    let queue = ImportQueue::new(redis_client);

    // The status store is a hard dependency: refuse to start if unreachable.
    status
        .health_check()
        .await
        .expect("Redis is unreachable; refusing to start");

    // Stage directory for uploaded CSV files
    let upload_dir = std::path::PathBuf::from(&config.upload_dir);
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .expect("Failed to create upload directory");

    let auth = JwtVerifier::new(&config.jwt_secret);

    // Create shared application state
    let state = AppState::new(db_pool, status, queue, auth, upload_dir);

    // Build API routes
    let app = Router::new()
        .route(
            "/",
            get(|| async { Json(json!({ "message": "Welcome to the book repository" })) }),
        )
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/books/import", post(routes::import::submit_import))
        .route(
            "/api/v1/books/import/{job_id}",
            get(routes::import::get_import_status),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting book-import on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
