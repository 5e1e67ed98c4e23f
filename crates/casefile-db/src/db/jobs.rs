use casefile_core::constants::SCAN_JOB_NOTIFY_CHANNEL;
use casefile_core::models::{CaseFile, ScanJob};
use casefile_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Repository for the `scan_jobs` queue.
///
/// Enqueues fire a `pg_notify` so the worker pool wakes immediately;
/// claiming uses `FOR UPDATE SKIP LOCKED` so concurrent workers never
/// double-claim a job.
#[derive(Clone)]
pub struct ScanJobRepository {
    pool: PgPool,
}

impl ScanJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a scan job for a file and wake the worker pool.
    #[tracing::instrument(skip(self, file), fields(db.table = "scan_jobs", db.operation = "insert", file_id = %file.id))]
    pub async fn enqueue(&self, file: &CaseFile) -> Result<ScanJob, AppError> {
        let mut tx = self.pool.begin().await?;

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

        tracing::info!(
            job_id = %job.id,
            file_id = %file.id,
            "Scan job enqueued"
        );

        Ok(job)
    }

    /// Claim the next pending job, oldest first.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so parallel workers skip rows another
    /// claim transaction already holds.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next_job(&self) -> Result<Option<ScanJob>, AppError> {
        let mut tx = self.pool.begin().await?;

        let job: Option<ScanJob> = sqlx::query_as::<Postgres, ScanJob>(
            r#"
            SELECT * FROM scan_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            tx.commit().await?;
            return Ok(None);
        };

        let claimed = sqlx::query_as::<Postgres, ScanJob>(
            r#"
            UPDATE scan_jobs
            SET status = 'running',
                claimed_at = NOW(),
                attempts = attempts + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            job_id = %claimed.id,
            file_id = %claimed.file_id,
            attempts = claimed.attempts,
            "Scan job claimed"
        );

        Ok(Some(claimed))
    }

    #[tracing::instrument(skip(self), fields(db.table = "scan_jobs", db.operation = "update", db.record_id = %id))]
    pub async fn mark_completed(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE scan_jobs SET status = 'completed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "scan_jobs", db.operation = "update", db.record_id = %id))]
    pub async fn mark_failed(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE scan_jobs SET status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Return stale running jobs to `pending`. A job only stays `running`
    /// past the grace period when its worker died mid-scan; requeueing it
    /// is safe because processing is idempotent per file.
    #[tracing::instrument(skip(self), fields(db.table = "scan_jobs", db.operation = "update"))]
    pub async fn requeue_stale_jobs(&self, grace_seconds: i32) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'pending',
                claimed_at = NULL
            WHERE status = 'running'
              AND claimed_at < NOW() - ($1 * INTERVAL '1 second')
            "#,
        )
        .bind(grace_seconds)
        .execute(&self.pool)
        .await?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            tracing::warn!(requeued = requeued, "Requeued stale running scan jobs");
        }

        Ok(requeued)
    }

    /// Pending jobs waiting for a worker (for the health endpoint).
    #[tracing::instrument(skip(self), fields(db.table = "scan_jobs", db.operation = "select"))]
    pub async fn queue_depth(&self) -> Result<i64, AppError> {
        let (depth,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM scan_jobs WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(depth)
    }
}
