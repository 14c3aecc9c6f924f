use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{ImportJob, JobStatusResponse, SubmitResponse};
use crate::routes::ApiError;
use crate::services::queue::QueuedImport;

/// POST /api/v1/books/import — upload a CSV of books for bulk import.
///
/// Synchronous part only: shape checks, job id allocation, status record
/// creation, and enqueueing. Row-level processing happens in the worker; the
/// caller polls the returned job id.
pub async fn submit_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let caller = state.auth.current_caller(&headers)?;

    // Extract the CSV file from the multipart upload
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("malformed multipart body"))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::bad_request("could not read uploaded file"))?;
            upload = Some((filename, data));
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::bad_request("missing \"file\" field in upload"))?;

    if !filename.to_lowercase().ends_with(".csv") {
        tracing::warn!(filename = %filename, "Invalid file type uploaded");
        return Err(ApiError::bad_request(
            "invalid file type, only CSV files are allowed",
        ));
    }
    if data.is_empty() {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }

    let job_id = Uuid::new_v4();

    // Stage the file for the worker before anything becomes visible.
    let file_path = state.upload_dir.join(format!("{}.csv", job_id));
    tokio::fs::write(&file_path, &data).await.map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "Failed to stage upload file");
        ApiError::internal("could not store uploaded file")
    })?;

    // Create the status record first: a job id is only handed out once the
    // caller can track it. A rejected submission must not leave its staged
    // file behind, no worker will ever claim it.
    let job = ImportJob::new(job_id, &caller.user_id);
    if let Err(e) = state.status.create(&job).await {
        tracing::error!(job_id = %job_id, error = %e, "Failed to create status record");
        discard_staged(&file_path).await;
        return Err(ApiError::internal("status store unavailable"));
    }

    let queued = QueuedImport {
        job_id,
        file_path: file_path.to_string_lossy().into_owned(),
        submitted_by: caller.user_id.clone(),
    };
    if let Err(e) = state.queue.enqueue(&queued).await {
        tracing::error!(job_id = %job_id, error = %e, "Failed to enqueue import job");
        discard_staged(&file_path).await;
        return Err(ApiError::internal("job queue unavailable"));
    }

    metrics::counter!("import_jobs_total").increment(1);
    tracing::info!(
        job_id = %job_id,
        filename = %filename,
        size_bytes = data.len(),
        submitted_by = %caller.user_id,
        "CSV upload accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: "pending".to_string(),
            message: "CSV upload scheduled for processing".to_string(),
        }),
    ))
}

/// Best-effort removal of a staged upload that will never be processed.
async fn discard_staged(file_path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(file_path).await {
        tracing::warn!(
            file_path = %file_path.display(),
            error = %e,
            "Failed to delete staged upload file"
        );
    }
}

/// GET /api/v1/books/import/{job_id} — poll import job status.
pub async fn get_import_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let caller = state.auth.current_caller(&headers)?;

    let job = state.status.get(job_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found("unknown import job")
        } else {
            tracing::error!(job_id = %job_id, error = %e, "Failed to read status record");
            ApiError::internal("status store unavailable")
        }
    })?;

    if job.submitted_by != caller.user_id {
        tracing::warn!(job_id = %job_id, user_id = %caller.user_id, "Status query for another caller's import");
        return Err(ApiError::forbidden("not authorized to view this import"));
    }

    Ok(Json(job.into()))
}
