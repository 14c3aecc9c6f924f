use book_import::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries},
    models::book::NewBook,
    models::job::{ImportJob, ImportState},
    services::{
        auth::JwtVerifier,
        import,
        queue::{ImportQueue, QueuedImport},
        status::{StatusError, StatusStore},
    },
};
use chrono::NaiveDate;
use uuid::Uuid;

// These tests exercise the full import pipeline against live PostgreSQL and
// Redis instances configured via environment variables.
// Run with: cargo test --test import_flow_test -- --ignored

async fn test_state() -> AppState {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    let status = StatusStore::new(redis_client.clone());
    let queue = ImportQueue::new(redis_client);
    status.health_check().await.expect("Redis unreachable");

    AppState::new(
        db_pool,
        status,
        queue,
        JwtVerifier::new(&config.jwt_secret),
        std::env::temp_dir(),
    )
}

/// Stage a CSV in the temp dir, create the PENDING status record, and run
/// the processor over it the way the worker would.
async fn run_upload(state: &AppState, csv: &str) -> ImportJob {
    let job_id = Uuid::new_v4();
    let file_path = std::env::temp_dir().join(format!("book-import-test-{}.csv", job_id));
    tokio::fs::write(&file_path, csv)
        .await
        .expect("Failed to stage CSV");

    state
        .status
        .create(&ImportJob::new(job_id, "test-user"))
        .await
        .expect("Failed to create status record");

    let queued = QueuedImport {
        job_id,
        file_path: file_path.to_string_lossy().into_owned(),
        submitted_by: "test-user".to_string(),
    };
    import::run_import(state, &queued)
        .await
        .expect("Import run failed");

    state.status.get(job_id).await.expect("Status record gone")
}

/// Unique title so repeated test runs don't trip the catalog-wide
/// duplicate detection.
fn title(prefix: &str) -> String {
    format!("{} {}", prefix, Uuid::new_v4())
}

#[tokio::test]
#[ignore]
async fn test_clean_upload_completes() {
    let state = test_state().await;
    let (a, b) = (title("Clean Upload A"), title("Clean Upload B"));
    let csv = format!(
        "title,author,price,publication_date\n\
         {},Author One,12.50,2019-05-01\n\
         {},Author Two,7.99,2021-11-30\n",
        a, b
    );

    let job = run_upload(&state, &csv).await;

    assert_eq!(job.state, ImportState::Completed);
    assert_eq!(job.total_rows, Some(2));
    assert_eq!(job.processed_rows, 2);
    assert_eq!(job.failed_rows, 0);
    assert!(job.errors.is_empty());
    assert!(job.completed_at.is_some());

    // Terminal records are immutable: repeated reads return the same snapshot.
    let again = state.status.get(job.job_id).await.unwrap();
    assert_eq!(
        serde_json::to_value(&again).unwrap(),
        serde_json::to_value(&job).unwrap()
    );
}

#[tokio::test]
#[ignore]
async fn test_duplicate_title_within_upload() {
    let state = test_state().await;
    let shared = title("Clean Code");
    let csv = format!(
        "title,author,price,publication_date\n\
         {},Robert C. Martin,29.99,2008-08-11\n\
         {},Other Author,9.99,2020-01-01\n",
        shared,
        shared.to_uppercase()
    );

    let job = run_upload(&state, &csv).await;

    assert_eq!(job.state, ImportState::CompletedWithErrors);
    assert_eq!(job.processed_rows, 1);
    assert_eq!(job.failed_rows, 1);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row, 2);
    assert_eq!(job.errors[0].field, "title");
    assert_eq!(job.errors[0].message, "duplicate");
}

#[tokio::test]
#[ignore]
async fn test_invalid_row_does_not_stop_processing() {
    let state = test_state().await;
    let (a, b) = (title("Mixed A"), title("Mixed B"));
    // Middle row is missing its price.
    let csv = format!(
        "title,author,price,publication_date\n\
         {},Author One,5.00,2015-03-03\n\
         {},Author Two,,2016-04-04\n\
         {},Author Three,6.00,2017-05-05\n",
        a,
        title("Mixed no-price"),
        b
    );

    let job = run_upload(&state, &csv).await;

    assert_eq!(job.state, ImportState::CompletedWithErrors);
    assert_eq!(job.total_rows, Some(3));
    assert_eq!(job.processed_rows, 2);
    assert_eq!(job.failed_rows, 1);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row, 2);
    assert_eq!(job.errors[0].field, "price");
    assert_eq!(job.errors[0].message, "missing");
}

#[tokio::test]
#[ignore]
async fn test_header_mismatch_fails_without_processing() {
    let state = test_state().await;
    let csv = "title,author,price\nSome Book,Someone,5.00\n";

    let job = run_upload(&state, csv).await;

    assert_eq!(job.state, ImportState::Failed);
    assert_eq!(job.total_rows, None);
    assert_eq!(job.processed_rows, 0);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row, 0);
    assert_eq!(job.errors[0].field, "schema");
    assert!(job.errors[0].message.contains("publication_date"));
}

#[tokio::test]
#[ignore]
async fn test_negative_price_only_row_fails_job() {
    let state = test_state().await;
    let csv = format!(
        "title,author,price,publication_date\n{},Y,-5,2020-01-01\n",
        title("Negative Price")
    );

    let job = run_upload(&state, &csv).await;

    assert_eq!(job.state, ImportState::Failed);
    assert_eq!(job.processed_rows, 0);
    assert_eq!(job.failed_rows, 1);
    assert_eq!(job.errors[0].row, 1);
    assert_eq!(job.errors[0].field, "price");
    assert_eq!(job.errors[0].message, "negative");
}

#[tokio::test]
#[ignore]
async fn test_unreadable_file_fails_with_single_synthetic_error() {
    let state = test_state().await;
    let job_id = Uuid::new_v4();
    state
        .status
        .create(&ImportJob::new(job_id, "test-user"))
        .await
        .expect("Failed to create status record");

    // The staged path never existed, so the job cannot read a single row.
    let queued = QueuedImport {
        job_id,
        file_path: std::env::temp_dir()
            .join(format!("book-import-missing-{}.csv", job_id))
            .to_string_lossy()
            .into_owned(),
        submitted_by: "test-user".to_string(),
    };
    import::run_import(&state, &queued)
        .await
        .expect("Import run failed");

    let job = state.status.get(job_id).await.unwrap();
    assert_eq!(job.state, ImportState::Failed);
    assert_eq!(job.total_rows, None);
    assert_eq!(job.processed_rows, 0);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row, 0);
    assert_eq!(job.errors[0].field, "file");
    assert!(job.completed_at.is_some());
}

#[tokio::test]
#[ignore]
async fn test_staged_file_removed_when_job_cannot_start() {
    let state = test_state().await;
    let job_id = Uuid::new_v4();
    let file_path = std::env::temp_dir().join(format!("book-import-orphan-{}.csv", job_id));
    tokio::fs::write(&file_path, "title,author,price,publication_date\n")
        .await
        .expect("Failed to stage CSV");

    // No status record exists for this job id, so the processor cannot even
    // transition it to PROCESSING; the staged file must not be left behind.
    let queued = QueuedImport {
        job_id,
        file_path: file_path.to_string_lossy().into_owned(),
        submitted_by: "test-user".to_string(),
    };
    let err = import::run_import(&state, &queued).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!file_path.exists());
}

#[tokio::test]
#[ignore]
async fn test_catalog_seeded_duplicate_detection() {
    let state = test_state().await;

    // A title already in the catalog is rejected even on its first
    // appearance in the upload.
    let existing = title("Already Catalogued");
    queries::insert_book(
        &state.db,
        &NewBook {
            title: existing.clone(),
            author: "Earlier Import".to_string(),
            price: 10.0,
            publication_date: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        },
    )
    .await
    .expect("Failed to seed catalog");

    let csv = format!(
        "title,author,price,publication_date\n{},Someone Else,4.00,2022-02-02\n",
        existing.to_lowercase()
    );

    let job = run_upload(&state, &csv).await;

    assert_eq!(job.state, ImportState::Failed);
    assert_eq!(job.processed_rows, 0);
    assert_eq!(job.errors[0].field, "title");
    assert_eq!(job.errors[0].message, "duplicate");
}

#[tokio::test]
#[ignore]
async fn test_status_store_contract() {
    let state = test_state().await;
    let job = ImportJob::new(Uuid::new_v4(), "test-user");

    state.status.create(&job).await.expect("First create failed");
    let err = state.status.create(&job).await.unwrap_err();
    assert!(matches!(err, StatusError::AlreadyExists(_)));

    let missing = state.status.get(Uuid::new_v4()).await.unwrap_err();
    assert!(missing.is_not_found());

    let updated = state
        .status
        .update(job.job_id, |j| j.state = ImportState::Processing)
        .await
        .unwrap();
    assert_eq!(updated.state, ImportState::Processing);
}

#[tokio::test]
#[ignore]
async fn test_queue_roundtrip() {
    let state = test_state().await;
    let queued = QueuedImport {
        job_id: Uuid::new_v4(),
        file_path: "/tmp/nowhere.csv".to_string(),
        submitted_by: "test-user".to_string(),
    };

    state.queue.enqueue(&queued).await.expect("Enqueue failed");
    assert!(state.queue.queue_depth().await.unwrap() >= 1);

    // Drain until we find our job; other tests may share the queue.
    loop {
        let job = state
            .queue
            .dequeue()
            .await
            .expect("Dequeue failed")
            .expect("Queue empty before our job appeared");
        let found = job.job_id == queued.job_id;
        state.queue.complete(&job).await.expect("Complete failed");
        if found {
            break;
        }
    }
}
