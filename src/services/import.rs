use chrono::Utc;
use csv_async::{AsyncReaderBuilder, Trim};
use futures::StreamExt;
use tokio::fs::File;

use crate::app_state::AppState;
use crate::db::queries::{self, InsertOutcome};
use crate::models::job::{ImportState, RowError};
use crate::services::queue::QueuedImport;
use crate::services::status::StatusError;
use crate::services::validation::{self, ColumnMap, RowRejection};

/// Why a job stopped before reaching end of file. Row-level rejections are
/// recorded on the status record and never take this path.
enum JobAbort {
    /// File-structure or infrastructure fault: recorded as a single
    /// synthetic row error and the job transitions to FAILED.
    Fault {
        row: u64,
        field: &'static str,
        message: String,
    },
    /// The status store itself is unreachable; nothing can be recorded.
    Status(StatusError),
}

impl From<StatusError> for JobAbort {
    fn from(e: StatusError) -> Self {
        JobAbort::Status(e)
    }
}

/// Process one import job from PROCESSING start to a terminal state.
///
/// Owns the job end-to-end: header check, per-row validation and persistence,
/// incremental status updates, terminal transition, and cleanup of the staged
/// upload file. Returns an error only if the status store is unreachable, in
/// which case the job may be left PROCESSING (documented limitation).
pub async fn run_import(state: &AppState, queued: &QueuedImport) -> Result<(), StatusError> {
    let start = std::time::Instant::now();
    let job_id = queued.job_id;

    tracing::info!(
        job_id = %job_id,
        file_path = %queued.file_path,
        submitted_by = %queued.submitted_by,
        "Starting CSV import"
    );

    if let Err(e) = state
        .status
        .update(job_id, |j| j.state = ImportState::Processing)
        .await
    {
        cleanup_upload(queued).await;
        return Err(e);
    }

    let outcome = stream_rows(state, queued).await;

    let finished = match outcome {
        Ok(()) => {
            state
                .status
                .update(job_id, |j| {
                    j.total_rows = Some(j.processed_rows + j.failed_rows);
                    j.completed_at = Some(Utc::now());
                    j.state = if j.failed_rows == 0 {
                        ImportState::Completed
                    } else if j.processed_rows > 0 {
                        ImportState::CompletedWithErrors
                    } else {
                        ImportState::Failed
                    };
                })
                .await?
        }
        Err(JobAbort::Fault { row, field, message }) => {
            tracing::error!(job_id = %job_id, row = row, field = field, error = %message, "Import aborted");
            let error = RowError {
                row,
                field: field.to_string(),
                message,
            };
            state
                .status
                .update(job_id, move |j| {
                    j.errors.push(error.clone());
                    j.completed_at = Some(Utc::now());
                    j.state = ImportState::Failed;
                })
                .await?
        }
        Err(JobAbort::Status(e)) => {
            cleanup_upload(queued).await;
            return Err(e);
        }
    };

    match finished.state {
        ImportState::Failed => metrics::counter!("import_jobs_failed").increment(1),
        _ => metrics::counter!("import_jobs_completed").increment(1),
    }
    metrics::histogram!("import_processing_seconds").record(start.elapsed().as_secs_f64());

    tracing::info!(
        job_id = %job_id,
        state = ?finished.state,
        processed_rows = finished.processed_rows,
        failed_rows = finished.failed_rows,
        "Import finished"
    );

    cleanup_upload(queued).await;
    Ok(())
}

/// Stream the CSV one record at a time, validating and persisting each row
/// and publishing progress after every row. Memory stays bounded regardless
/// of file size.
async fn stream_rows(state: &AppState, queued: &QueuedImport) -> Result<(), JobAbort> {
    let job_id = queued.job_id;

    let file = File::open(&queued.file_path).await.map_err(|e| JobAbort::Fault {
        row: 0,
        field: "file",
        message: format!("could not open upload: {}", e),
    })?;

    let mut reader = AsyncReaderBuilder::new().trim(Trim::All).create_reader(file);

    let headers = reader
        .headers()
        .await
        .map_err(|e| JobAbort::Fault {
            row: 0,
            field: "schema",
            message: format!("could not read header row: {}", e),
        })?
        .clone();

    // Header mismatch fails the whole job before any row is processed.
    let columns = ColumnMap::from_headers(&headers).map_err(|missing| JobAbort::Fault {
        row: 0,
        field: "schema",
        message: format!("missing required columns: {}", missing.join(", ")),
    })?;

    // Read-only snapshot seeding in-job duplicate detection. Races against
    // concurrent imports are caught by the unique index at insert time.
    let mut seen_titles =
        queries::catalog_titles(&state.db)
            .await
            .map_err(|e| JobAbort::Fault {
                row: 0,
                field: "catalog",
                message: format!("could not read catalog snapshot: {}", e),
            })?;

    let mut records = reader.records();
    let mut row_number: u64 = 0;

    while let Some(record) = records.next().await {
        row_number += 1;
        let record = record.map_err(|e| JobAbort::Fault {
            row: row_number,
            field: "file",
            message: format!("unreadable row: {}", e),
        })?;

        match validation::validate_row(&record, &columns, &seen_titles) {
            Ok(book) => match queries::insert_book(&state.db, &book).await {
                Ok(InsertOutcome::Inserted(_)) => {
                    seen_titles.insert(book.title.to_lowercase());
                    state
                        .status
                        .update(job_id, |j| j.processed_rows += 1)
                        .await?;
                    tracing::debug!(job_id = %job_id, row = row_number, title = %book.title, "Row imported");
                }
                Ok(InsertOutcome::DuplicateTitle) => {
                    record_rejection(state, job_id, row_number, RowRejection::DuplicateTitle)
                        .await?;
                }
                Err(e) => {
                    return Err(JobAbort::Fault {
                        row: row_number,
                        field: "catalog",
                        message: format!("could not persist row: {}", e),
                    });
                }
            },
            Err(rejection) => {
                record_rejection(state, job_id, row_number, rejection).await?;
            }
        }
    }

    Ok(())
}

async fn record_rejection(
    state: &AppState,
    job_id: uuid::Uuid,
    row_number: u64,
    rejection: RowRejection,
) -> Result<(), StatusError> {
    tracing::warn!(
        job_id = %job_id,
        row = row_number,
        field = rejection.field(),
        reason = rejection.message(),
        "Row rejected"
    );
    let error = rejection.into_row_error(row_number);
    state
        .status
        .update(job_id, move |j| {
            j.failed_rows += 1;
            j.errors.push(error.clone());
        })
        .await?;
    Ok(())
}

async fn cleanup_upload(queued: &QueuedImport) {
    if let Err(e) = tokio::fs::remove_file(&queued.file_path).await {
        tracing::warn!(
            job_id = %queued.job_id,
            file_path = %queued.file_path,
            error = %e,
            "Failed to delete staged upload file"
        );
    }
}
