use std::marker::PhantomData;

use casefile_core::models::{FailureFeed, FailureKind, FailureRecord, KindCount};
use casefile_core::AppError;
use sqlx::{PgPool, Postgres};

/// Default batch size for draining unresolved failures.
pub const DEFAULT_FAILURE_BATCH_SIZE: i64 = 10;

/// Repository for `failure_records`, shared by every feed.
///
/// One row per `(feed, subject_id)`: the first failure creates it, every
/// further failure updates it in place and increments `retry_count`. Rows
/// are resolved exactly once and never deleted.
#[derive(Clone)]
pub struct FailureRepository {
    pool: PgPool,
}

impl FailureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a failure for a subject. A repeat failure overwrites kind,
    /// message, and context with the latest attempt's values; no history is
    /// kept beyond the latest.
    #[tracing::instrument(skip(self, context), fields(db.table = "failure_records", db.operation = "upsert", feed = %feed, subject_id = %subject_id))]
    pub async fn record_failure(
        &self,
        feed: FailureFeed,
        subject_id: &str,
        kind: &str,
        message: &str,
        context: serde_json::Value,
    ) -> Result<FailureRecord, AppError> {
        let record = sqlx::query_as::<Postgres, FailureRecord>(
            r#"
            INSERT INTO failure_records (feed, subject_id, kind, message, context, retry_count)
            VALUES ($1, $2, $3, $4, $5, 0)
            ON CONFLICT (feed, subject_id) DO UPDATE
            SET kind = EXCLUDED.kind,
                message = EXCLUDED.message,
                context = EXCLUDED.context,
                retry_count = failure_records.retry_count + 1,
                last_retry_at = NOW()
            RETURNING *
            "#,
        )
        .bind(feed)
        .bind(subject_id)
        .bind(kind)
        .bind(message)
        .bind(&context)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Unresolved failures ordered for retry: fewest prior attempts first,
    /// oldest first among ties, so no subject starves the rest.
    #[tracing::instrument(skip(self), fields(db.table = "failure_records", db.operation = "select", feed = %feed))]
    pub async fn list_unresolved(
        &self,
        feed: FailureFeed,
        limit: i64,
    ) -> Result<Vec<FailureRecord>, AppError> {
        let records = sqlx::query_as::<Postgres, FailureRecord>(
            r#"
            SELECT * FROM failure_records
            WHERE feed = $1 AND resolved_at IS NULL
            ORDER BY retry_count ASC, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(feed)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Resolve a subject's open failure. Guarded on `resolved_at IS NULL`,
    /// so calling it twice, or for a subject with no failure on record, is
    /// a silent no-op. Returns whether a row was actually resolved.
    #[tracing::instrument(skip(self), fields(db.table = "failure_records", db.operation = "update", feed = %feed, subject_id = %subject_id))]
    pub async fn mark_resolved(
        &self,
        feed: FailureFeed,
        subject_id: &str,
        resolution_ref: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE failure_records
            SET resolved_at = NOW(),
                resolution_ref = $3
            WHERE feed = $1 AND subject_id = $2 AND resolved_at IS NULL
            "#,
        )
        .bind(feed)
        .bind(subject_id)
        .bind(resolution_ref)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unresolved counts grouped by error kind, for dashboards.
    #[tracing::instrument(skip(self), fields(db.table = "failure_records", db.operation = "select", feed = %feed))]
    pub async fn count_by_kind(&self, feed: FailureFeed) -> Result<Vec<KindCount>, AppError> {
        let counts = sqlx::query_as::<Postgres, KindCount>(
            r#"
            SELECT kind, COUNT(*) AS count FROM failure_records
            WHERE feed = $1 AND resolved_at IS NULL
            GROUP BY kind
            ORDER BY kind
            "#,
        )
        .bind(feed)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    #[tracing::instrument(skip(self), fields(db.table = "failure_records", db.operation = "select", feed = %feed))]
    pub async fn list_unresolved_subject_ids(
        &self,
        feed: FailureFeed,
    ) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT subject_id FROM failure_records
            WHERE feed = $1 AND resolved_at IS NULL
            ORDER BY retry_count ASC, created_at ASC
            "#,
        )
        .bind(feed)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Typed view of the failure repository for one feed.
///
/// The subject id type and the error-kind enumeration are the only parts
/// that vary between the scan pipeline and the referral-import feed, so
/// the upsert/ordering logic lives once in [`FailureRepository`] and this
/// wrapper pins the feed and kind type.
#[derive(Clone)]
pub struct RetryTracker<K: FailureKind> {
    repository: FailureRepository,
    _kind: PhantomData<K>,
}

impl<K: FailureKind> RetryTracker<K> {
    pub fn new(repository: FailureRepository) -> Self {
        Self {
            repository,
            _kind: PhantomData,
        }
    }

    pub async fn record_failure(
        &self,
        subject_id: &str,
        kind: K,
        message: &str,
        context: serde_json::Value,
    ) -> Result<FailureRecord, AppError> {
        self.repository
            .record_failure(K::feed(), subject_id, kind.as_str(), message, context)
            .await
    }

    pub async fn list_unresolved(&self, limit: i64) -> Result<Vec<FailureRecord>, AppError> {
        self.repository.list_unresolved(K::feed(), limit).await
    }

    pub async fn mark_resolved(
        &self,
        subject_id: &str,
        resolution_ref: Option<&str>,
    ) -> Result<bool, AppError> {
        self.repository
            .mark_resolved(K::feed(), subject_id, resolution_ref)
            .await
    }

    pub async fn count_by_kind(&self) -> Result<Vec<KindCount>, AppError> {
        self.repository.count_by_kind(K::feed()).await
    }

    pub async fn list_unresolved_subject_ids(&self) -> Result<Vec<String>, AppError> {
        self.repository.list_unresolved_subject_ids(K::feed()).await
    }
}
