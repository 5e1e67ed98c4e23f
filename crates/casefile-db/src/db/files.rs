use casefile_core::constants::SCAN_JOB_NOTIFY_CHANNEL;
use casefile_core::models::{CaseFile, ScanJob};
use casefile_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Parameters for creating a file record after the object-store write
/// succeeded. The id is derived from the generated storage object name, so
/// it is fixed before the row exists.
#[derive(Debug, Clone)]
pub struct CreateFileParams {
    pub id: Uuid,
    pub original_filename: String,
    pub sanitized_filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub storage_key: String,
    pub storage_url: String,
    pub metadata: serde_json::Value,
}

/// Repository for `case_files`.
///
/// Status-field updates are last-writer-wins: exactly one worker owns a
/// file for the lifetime of a job, so no row locking is needed. Update
/// methods return `None` when the row has been deleted by the owning
/// business layer mid-flight.
#[derive(Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a file record in `pending`.
    #[tracing::instrument(skip(self, params), fields(db.table = "case_files", db.operation = "insert", db.record_id = %params.id))]
    pub async fn create(&self, params: CreateFileParams) -> Result<CaseFile, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            INSERT INTO case_files (
                id, original_filename, sanitized_filename, content_type,
                file_size, storage_key, storage_url, metadata,
                status, scan_status, sanitize_status, detected_threats
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 'pending', 'none', '{}')
            RETURNING *
            "#,
        )
        .bind(params.id)
        .bind(&params.original_filename)
        .bind(&params.sanitized_filename)
        .bind(&params.content_type)
        .bind(params.file_size)
        .bind(&params.storage_key)
        .bind(&params.storage_url)
        .bind(&params.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(file)
    }

    /// Create a file record in `pending` and its scan job in one
    /// transaction, then wake the worker pool.
    ///
    /// The record and the job are the one tentative-persist step that
    /// follows the object-store write: if either insert fails the other is
    /// rolled back with it, and the caller must roll back the blob.
    #[tracing::instrument(skip(self, params), fields(db.table = "case_files", db.operation = "insert", db.record_id = %params.id))]
    pub async fn create_with_scan_job(
        &self,
        params: CreateFileParams,
    ) -> Result<(CaseFile, ScanJob), AppError> {
        let mut tx = self.pool.begin().await?;

        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            INSERT INTO case_files (
                id, original_filename, sanitized_filename, content_type,
                file_size, storage_key, storage_url, metadata,
                status, scan_status, sanitize_status, detected_threats
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 'pending', 'none', '{}')
            RETURNING *
            "#,
        )
        .bind(params.id)
        .bind(&params.original_filename)
        .bind(&params.sanitized_filename)
        .bind(&params.content_type)
        .bind(params.file_size)
        .bind(&params.storage_key)
        .bind(&params.storage_url)
        .bind(&params.metadata)
        .fetch_one(&mut *tx)
        .await?;

        let job = sqlx::query_as::<Postgres, ScanJob>(
            r#"
            INSERT INTO scan_jobs (file_id, filename, storage_key, content_type, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            "#,
        )
        .bind(file.id)
        .bind(&file.sanitized_filename)
        .bind(&file.storage_key)
        .bind(&file.content_type)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(SCAN_JOB_NOTIFY_CHANNEL)
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((file, job))
    }

    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "select", db.record_id = %id))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>("SELECT * FROM case_files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    /// Transition into `scanning` when a worker picks the file up.
    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn mark_scanning(&self, id: Uuid) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET status = 'processing',
                scan_status = 'scanning',
                processing_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn record_scan_clean(&self, id: Uuid) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET scan_status = 'clean',
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// Infection is terminal: the file is rejected and never becomes
    /// available, no matter what runs afterwards.
    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn record_scan_infected(
        &self,
        id: Uuid,
        threats: &[String],
        message: &str,
    ) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET scan_status = 'infected',
                status = 'rejected',
                detected_threats = $2,
                processing_error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(threats)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// Scan failed for infrastructure reasons; the file stays unusable but
    /// eligible for re-scan. Never recorded as clean.
    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn record_scan_error(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET scan_status = 'error',
                status = 'error',
                processing_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn mark_sanitizing(&self, id: Uuid) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET sanitize_status = 'sanitizing',
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// Sanitization finished: record the safe copy's key and make the file
    /// available.
    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn record_sanitize_safe(
        &self,
        id: Uuid,
        safe_storage_key: &str,
    ) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET sanitize_status = 'safe',
                safe_storage_key = $2,
                status = 'ready',
                processing_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND scan_status = 'clean'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(safe_storage_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "case_files", db.operation = "update", db.record_id = %id))]
    pub async fn record_sanitize_failed(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<Option<CaseFile>, AppError> {
        let file = sqlx::query_as::<Postgres, CaseFile>(
            r#"
            UPDATE case_files
            SET sanitize_status = 'failed',
                status = 'error',
                processing_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }
}
