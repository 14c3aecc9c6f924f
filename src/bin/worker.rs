use book_import::{
    app_state::AppState,
    config::AppConfig,
    db,
    services::{auth::JwtVerifier, import, queue::ImportQueue, status::StatusStore},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting book import worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize Redis-backed status store and job queue
    tracing::info!("Connecting to Redis");
    let redis_client =
        redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    let status = StatusStore::new(redis_client.clone());
    let queue = ImportQueue::new(redis_client);

    status
        .health_check()
        .await
        .expect("Redis is unreachable; refusing to start");

    let auth = JwtVerifier::new(&config.jwt_secret);
    let upload_dir = std::path::PathBuf::from(&config.upload_dir);
    let state = AppState::new(db_pool, status, queue, auth, upload_dir);

    // One task per job, bounded so a burst of uploads cannot exhaust the
    // database pool.
    let limiter = Arc::new(Semaphore::new(config.max_concurrent_imports));

    tracing::info!(
        max_concurrent_imports = config.max_concurrent_imports,
        "Worker ready, starting job processing loop"
    );

    loop {
        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");

        match state.queue.dequeue().await {
            Ok(Some(job)) => {
                if let Ok(depth) = state.queue.queue_depth().await {
                    metrics::gauge!("import_queue_depth").set(depth as f64);
                }

                tracing::info!(
                    job_id = %job.job_id,
                    file_path = %job.file_path,
                    "Dequeued import job"
                );

                let task_state = state.clone();
                tokio::spawn(async move {
                    let _permit = permit;

                    // Jobs run once to a terminal state; an error here means
                    // the status store itself was unreachable.
                    if let Err(e) = import::run_import(&task_state, &job).await {
                        tracing::error!(
                            job_id = %job.job_id,
                            error = %e,
                            "Import abandoned, status store unreachable"
                        );
                    }

                    if let Err(e) = task_state.queue.complete(&job).await {
                        tracing::error!(
                            job_id = %job.job_id,
                            error = %e,
                            "Failed to remove job from processing list"
                        );
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Error polling job queue, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}
