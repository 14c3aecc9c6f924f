use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::services::{auth::JwtVerifier, queue::ImportQueue, status::StatusStore};

/// Shared application state passed to all route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub status: Arc<StatusStore>,
    pub queue: Arc<ImportQueue>,
    pub auth: Arc<JwtVerifier>,
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        status: StatusStore,
        queue: ImportQueue,
        auth: JwtVerifier,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            status: Arc::new(status),
            queue: Arc::new(queue),
            auth: Arc::new(auth),
            upload_dir: Arc::new(upload_dir),
        }
    }
}
