//! Durable crawl job queue on SQLite.
//!
//! Delivery semantics: at-least-once, one active consumer per job. A claim
//! atomically flips the earliest due `queued` row to `active` and counts a
//! delivery attempt. Failed jobs are rescheduled with exponential backoff
//! until `max_attempts` is exhausted, then parked in the `dead` state for
//! operators. Completed and dead rows are pruned on a retention schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::types::{CrawlRequest, IngestError};

/// Retry and retention policy for queued jobs.
#[derive(Clone, Debug)]
pub struct QueuePolicy {
    /// Delivery attempts per job before it is parked in the dead set.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between deliveries.
    pub backoff_base: Duration,
    /// How long completed jobs are kept before pruning.
    pub completed_retention: Duration,
    /// How long dead jobs are kept before pruning.
    pub dead_retention: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            completed_retention: Duration::from_secs(24 * 3600),
            dead_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl QueuePolicy {
    /// Backoff before redelivery after the given (1-based) failed attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

/// One claimed delivery of a crawl request.
#[derive(Clone, Debug)]
pub struct QueuedJob {
    pub id: String,
    /// Delivery attempts made so far, including this one.
    pub attempts_made: u32,
    pub request: CrawlRequest,
}

/// Outcome of failing a job back to the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailOutcome {
    /// Job was rescheduled; redelivery is due at the contained instant.
    Retrying { next_attempt_at: DateTime<Utc> },
    /// Attempts exhausted; job moved to the dead set.
    Dead,
}

/// SQLite-backed queue of [`CrawlRequest`]s.
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    policy: QueuePolicy,
}

impl JobQueue {
    pub fn new(pool: SqlitePool, policy: QueuePolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    /// Enqueues a crawl request for immediate delivery; returns the job id.
    #[instrument(skip(self, request), fields(crawl_id = %request.crawl_id))]
    pub async fn enqueue(&self, request: &CrawlRequest) -> Result<String, IngestError> {
        let job_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(request)
            .map_err(|err| IngestError::Queue(format!("payload encode: {err}")))?;
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO crawl_jobs
                (id, payload_json, state, attempts_made, max_attempts,
                 available_at, created_at, updated_at)
            VALUES (?1, ?2, 'queued', 0, ?3, ?4, ?4, ?4)
            "#,
        )
        .bind(&job_id)
        .bind(&payload)
        .bind(i64::from(self.policy.max_attempts))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Queue(format!("enqueue: {err}")))?;

        debug!(%job_id, "crawl request enqueued");
        Ok(job_id)
    }

    /// Claims the earliest due job, if any, marking it active and counting
    /// a delivery attempt. The transactional update guarantees a job is
    /// handed to at most one consumer at a time.
    pub async fn claim(&self) -> Result<Option<QueuedJob>, IngestError> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| IngestError::Queue(format!("tx begin: {err}")))?;

        let row = sqlx::query(
            r#"
            SELECT id, payload_json, attempts_made FROM crawl_jobs
            WHERE state = 'queued' AND available_at <= ?1
            ORDER BY available_at, created_at
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| IngestError::Queue(format!("claim select: {err}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let job_id: String = row
            .try_get("id")
            .map_err(|err| IngestError::Queue(format!("claim decode: {err}")))?;
        let payload: String = row
            .try_get("payload_json")
            .map_err(|err| IngestError::Queue(format!("claim decode: {err}")))?;
        let attempts_made: i64 = row
            .try_get("attempts_made")
            .map_err(|err| IngestError::Queue(format!("claim decode: {err}")))?;

        let updated = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET state = 'active', attempts_made = attempts_made + 1, updated_at = ?2
            WHERE id = ?1 AND state = 'queued'
            "#,
        )
        .bind(&job_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| IngestError::Queue(format!("claim update: {err}")))?;

        if updated.rows_affected() != 1 {
            // Lost the race to another consumer; treat as nothing due.
            tx.rollback()
                .await
                .map_err(|err| IngestError::Queue(format!("tx rollback: {err}")))?;
            return Ok(None);
        }

        tx.commit()
            .await
            .map_err(|err| IngestError::Queue(format!("tx commit: {err}")))?;

        let request: CrawlRequest = serde_json::from_str(&payload)
            .map_err(|err| IngestError::Queue(format!("payload decode: {err}")))?;

        Ok(Some(QueuedJob {
            id: job_id,
            attempts_made: u32::try_from(attempts_made + 1).unwrap_or(u32::MAX),
            request,
        }))
    }

    /// Marks a delivered job as completed.
    #[instrument(skip(self))]
    pub async fn complete(&self, job_id: &str) -> Result<(), IngestError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET state = 'completed', updated_at = ?2, finished_at = ?2
            WHERE id = ?1 AND state = 'active'
            "#,
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Queue(format!("complete: {err}")))?;
        Ok(())
    }

    /// Fails a delivered job: either reschedules it with backoff or, once
    /// attempts are exhausted, parks it in the dead set.
    #[instrument(skip(self, error))]
    pub async fn fail(&self, job_id: &str, error: &str) -> Result<FailOutcome, IngestError> {
        let row = sqlx::query(
            "SELECT attempts_made, max_attempts FROM crawl_jobs WHERE id = ?1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| IngestError::Queue(format!("fail select: {err}")))?
        .ok_or_else(|| IngestError::Queue(format!("unknown job '{job_id}'")))?;

        let attempts_made: i64 = row
            .try_get("attempts_made")
            .map_err(|err| IngestError::Queue(format!("fail decode: {err}")))?;
        let max_attempts: i64 = row
            .try_get("max_attempts")
            .map_err(|err| IngestError::Queue(format!("fail decode: {err}")))?;

        let now = Utc::now();
        if attempts_made >= max_attempts {
            sqlx::query(
                r#"
                UPDATE crawl_jobs
                SET state = 'dead', last_error = ?2, updated_at = ?3, finished_at = ?3
                WHERE id = ?1
                "#,
            )
            .bind(job_id)
            .bind(error)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|err| IngestError::Queue(format!("fail update: {err}")))?;

            info!(%job_id, attempts_made, "job moved to dead set");
            return Ok(FailOutcome::Dead);
        }

        let backoff = self
            .policy
            .backoff_for_attempt(u32::try_from(attempts_made).unwrap_or(u32::MAX));
        let next_attempt_at = now
            + chrono::Duration::from_std(backoff)
                .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));

        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET state = 'queued', last_error = ?2, available_at = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_attempt_at.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Queue(format!("fail update: {err}")))?;

        debug!(%job_id, attempts_made, ?backoff, "job rescheduled");
        Ok(FailOutcome::Retrying { next_attempt_at })
    }

    /// Deletes completed and dead jobs past their retention windows.
    /// Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn prune(&self) -> Result<u64, IngestError> {
        let now = Utc::now().timestamp_millis();
        let completed_cutoff = now - self.policy.completed_retention.as_millis() as i64;
        let dead_cutoff = now - self.policy.dead_retention.as_millis() as i64;

        let result = sqlx::query(
            r#"
            DELETE FROM crawl_jobs
            WHERE (state = 'completed' AND finished_at <= ?1)
               OR (state = 'dead' AND finished_at <= ?2)
            "#,
        )
        .bind(completed_cutoff)
        .bind(dead_cutoff)
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Queue(format!("prune: {err}")))?;

        Ok(result.rows_affected())
    }

    /// Current job state, for tests and operator tooling.
    pub async fn job_state(&self, job_id: &str) -> Result<Option<String>, IngestError> {
        let row = sqlx::query("SELECT state FROM crawl_jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| IngestError::Queue(format!("job_state: {err}")))?;
        row.map(|row| {
            row.try_get::<String, _>("state")
                .map_err(|err| IngestError::Queue(format!("job_state decode: {err}")))
        })
        .transpose()
    }

    #[cfg(test)]
    async fn force_available(&self, job_id: &str) -> Result<(), IngestError> {
        sqlx::query("UPDATE crawl_jobs SET available_at = 0 WHERE id = ?1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|err| IngestError::Queue(format!("force_available: {err}")))?;
        Ok(())
    }

    #[cfg(test)]
    async fn force_finished_at(&self, job_id: &str, finished_at: i64) -> Result<(), IngestError> {
        sqlx::query("UPDATE crawl_jobs SET finished_at = ?2 WHERE id = ?1")
            .bind(job_id)
            .bind(finished_at)
            .execute(&self.pool)
            .await
            .map_err(|err| IngestError::Queue(format!("force_finished_at: {err}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("policy", &self.policy)
            .finish()
    }
}
