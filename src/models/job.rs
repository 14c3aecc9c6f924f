use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a bulk-import job.
///
/// `Pending → Processing → {Completed | CompletedWithErrors | Failed}`;
/// the three outcome states are terminal and never regress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportState::Completed | ImportState::CompletedWithErrors | ImportState::Failed
        )
    }
}

/// Why one CSV row was rejected. Row 1 is the first data row; the header
/// line is row 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowError {
    pub row: u64,
    pub field: String,
    pub message: String,
}

/// The full status record for one import job, stored as a single JSON value
/// in Redis and mutated only by the worker that owns the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: Uuid,
    pub state: ImportState,
    /// Unknown until the whole file has been read.
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    pub failed_rows: u64,
    pub errors: Vec<RowError>,
    pub submitted_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(job_id: Uuid, submitted_by: &str) -> Self {
        Self {
            job_id,
            state: ImportState::Pending,
            total_rows: None,
            processed_rows: 0,
            failed_rows: 0,
            errors: Vec::new(),
            submitted_by: submitted_by.to_string(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Response after submitting a CSV for import.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

/// Response for querying import job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: ImportState,
    pub message: String,
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    pub failed_rows: u64,
    pub errors: Vec<RowError>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ImportJob> for JobStatusResponse {
    fn from(job: ImportJob) -> Self {
        let message = match job.state {
            ImportState::Pending | ImportState::Processing => {
                "Your file is still being processed. Please check again later."
            }
            ImportState::Completed => "Your file was processed successfully.",
            ImportState::CompletedWithErrors => {
                "Your file was processed, but some rows were rejected. Check the errors for details."
            }
            ImportState::Failed => "Your file processing failed. Check the errors for details.",
        }
        .to_string();

        Self {
            job_id: job.job_id,
            state: job.state,
            message,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            failed_rows: job.failed_rows,
            errors: job.errors,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ImportState::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");
        let back: ImportState = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(back, ImportState::Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ImportState::Pending.is_terminal());
        assert!(!ImportState::Processing.is_terminal());
        assert!(ImportState::Completed.is_terminal());
        assert!(ImportState::CompletedWithErrors.is_terminal());
        assert!(ImportState::Failed.is_terminal());
    }

    #[test]
    fn test_new_job_is_pending_with_empty_counters() {
        let job = ImportJob::new(Uuid::new_v4(), "user-1");
        assert_eq!(job.state, ImportState::Pending);
        assert_eq!(job.total_rows, None);
        assert_eq!(job.processed_rows, 0);
        assert_eq!(job.failed_rows, 0);
        assert!(job.errors.is_empty());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_status_record_round_trips_through_json() {
        let mut job = ImportJob::new(Uuid::new_v4(), "user-1");
        job.state = ImportState::CompletedWithErrors;
        job.total_rows = Some(3);
        job.processed_rows = 2;
        job.failed_rows = 1;
        job.errors.push(RowError {
            row: 2,
            field: "title".to_string(),
            message: "duplicate".to_string(),
        });

        let payload = serde_json::to_string(&job).unwrap();
        let back: ImportJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert_eq!(back.state, ImportState::CompletedWithErrors);
        assert_eq!(back.errors, job.errors);
    }
}
