use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::job::ImportJob;

const STATUS_KEY_PREFIX: &str = "book_import:status:";

// Swap the record only if it is unchanged since the read that fed the
// mutator; the caller retries on a lost race.
const CAS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

fn status_key(job_id: Uuid) -> String {
    format!("{}{}", STATUS_KEY_PREFIX, job_id)
}

/// Redis-backed store for import job status records.
///
/// One key per job, holding the full record as a single JSON value. Every
/// write replaces the whole value, so concurrent readers always observe a
/// complete snapshot. Records are mutated only by the worker that owns the
/// job; this store never deletes them (retention is an external concern).
pub struct StatusStore {
    client: redis::Client,
}

impl StatusStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Create the status record for a new job.
    /// Fails with `AlreadyExists` if the job id is already present.
    pub async fn create(&self, job: &ImportJob) -> Result<(), StatusError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(StatusError::Redis)?;
        let payload = serde_json::to_string(job).map_err(StatusError::Serialize)?;
        let created: bool = conn
            .set_nx(status_key(job.job_id), &payload)
            .await
            .map_err(StatusError::Redis)?;
        if !created {
            return Err(StatusError::AlreadyExists(job.job_id));
        }
        Ok(())
    }

    /// Atomic read-modify-write of a job's status record.
    ///
    /// Implemented as a compare-and-swap on the serialized record: the
    /// mutator is reapplied to a fresh snapshot if another write lands
    /// between the read and the swap, so the contract holds even beyond the
    /// single-writer-per-job ownership the pipeline maintains. A record
    /// already in a terminal state is returned unchanged: terminal states
    /// never regress, so repeated reads after completion are idempotent.
    /// Returns the record as stored after the call.
    pub async fn update<F>(&self, job_id: Uuid, mutator: F) -> Result<ImportJob, StatusError>
    where
        F: Fn(&mut ImportJob),
    {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(StatusError::Redis)?;
        let key = status_key(job_id);
        let script = redis::Script::new(CAS_SCRIPT);

        loop {
            let payload: Option<String> = conn.get(&key).await.map_err(StatusError::Redis)?;
            let payload = payload.ok_or(StatusError::NotFound(job_id))?;
            let mut job: ImportJob =
                serde_json::from_str(&payload).map_err(StatusError::Serialize)?;

            if job.state.is_terminal() {
                return Ok(job);
            }

            mutator(&mut job);
            let updated = serde_json::to_string(&job).map_err(StatusError::Serialize)?;

            let swapped: i64 = script
                .key(&key)
                .arg(&payload)
                .arg(&updated)
                .invoke_async(&mut conn)
                .await
                .map_err(StatusError::Redis)?;
            if swapped == 1 {
                return Ok(job);
            }
        }
    }

    /// Get the current snapshot of a job's status record.
    pub async fn get(&self, job_id: Uuid) -> Result<ImportJob, StatusError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(StatusError::Redis)?;
        let payload: Option<String> = conn
            .get(status_key(job_id))
            .await
            .map_err(StatusError::Redis)?;
        let payload = payload.ok_or(StatusError::NotFound(job_id))?;
        serde_json::from_str(&payload).map_err(StatusError::Serialize)
    }

    /// Check Redis connectivity. The store is a hard dependency: the server
    /// refuses to start if this fails.
    pub async fn health_check(&self) -> Result<(), StatusError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(StatusError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(StatusError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("status record already exists for job {0}")]
    AlreadyExists(Uuid),

    #[error("no status record for job {0}")]
    NotFound(Uuid),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StatusError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StatusError::NotFound(_))
    }
}
