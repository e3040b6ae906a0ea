//! Crawl and project status records.
//!
//! The relational store is the single source of truth for dashboard-visible
//! state. The API layer creates the initial `PENDING` crawl (and the project
//! row); once a job is delivered, the worker is the sole writer of every
//! later transition. A crawl that ended `COMPLETED` is never mutated again;
//! a `FAILED` crawl may re-enter `PROCESSING` when the queue redelivers it.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::types::{CrawlRecord, CrawlStatus, IngestError, ProjectRecord, ProjectStatus};

/// Store for `Crawl`/`Project` records on the shared SQLite pool.
#[derive(Clone)]
pub struct StatusStore {
    pool: SqlitePool,
}

impl StatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a project in `CREATING` with its vector-store namespace.
    #[instrument(skip(self))]
    pub async fn create_project(
        &self,
        project_id: &str,
        namespace: &str,
    ) -> Result<ProjectRecord, IngestError> {
        sqlx::query("INSERT INTO projects (id, status, namespace) VALUES (?1, ?2, ?3)")
            .bind(project_id)
            .bind(ProjectStatus::Creating.as_str())
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(|err| IngestError::Status(format!("create project: {err}")))?;
        Ok(ProjectRecord {
            id: project_id.to_string(),
            status: ProjectStatus::Creating,
            namespace: namespace.to_string(),
        })
    }

    pub async fn get_project(&self, project_id: &str) -> Result<ProjectRecord, IngestError> {
        let row = sqlx::query("SELECT id, status, namespace FROM projects WHERE id = ?1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| IngestError::Status(format!("get project: {err}")))?
            .ok_or_else(|| IngestError::Status(format!("unknown project '{project_id}'")))?;

        Ok(ProjectRecord {
            id: get_text(&row, "id")?,
            status: ProjectStatus::parse(&get_text(&row, "status")?)?,
            namespace: get_text(&row, "namespace")?,
        })
    }

    /// Sets a project's readiness. Only `READY`/`FAILED` are written after
    /// creation; a project never returns to `CREATING`.
    #[instrument(skip(self))]
    pub async fn set_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> Result<(), IngestError> {
        sqlx::query("UPDATE projects SET status = ?2 WHERE id = ?1")
            .bind(project_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| IngestError::Status(format!("set project status: {err}")))?;
        Ok(())
    }

    /// Creates the initial `PENDING` crawl record at enqueue time.
    #[instrument(skip(self))]
    pub async fn create_crawl(
        &self,
        crawl_id: &str,
        project_id: &str,
    ) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            INSERT INTO crawls (id, project_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(crawl_id)
        .bind(project_id)
        .bind(CrawlStatus::Pending.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Status(format!("create crawl: {err}")))?;
        Ok(())
    }

    /// Transitions a crawl to `PROCESSING` and stamps `started_at`.
    ///
    /// A `COMPLETED` crawl is terminal; attempting to reprocess one is a
    /// defect and is rejected. `FAILED` is re-enterable because the queue
    /// redelivers failed jobs.
    #[instrument(skip(self))]
    pub async fn mark_processing(&self, crawl_id: &str) -> Result<(), IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE crawls
            SET status = ?2, started_at = ?3, error = NULL, finished_at = NULL
            WHERE id = ?1 AND status != ?4
            "#,
        )
        .bind(crawl_id)
        .bind(CrawlStatus::Processing.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(CrawlStatus::Completed.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Status(format!("mark processing: {err}")))?;

        if result.rows_affected() != 1 {
            return Err(IngestError::Status(format!(
                "crawl '{crawl_id}' missing or already completed"
            )));
        }
        Ok(())
    }

    /// Finalizes a successful crawl with its page count.
    #[instrument(skip(self))]
    pub async fn mark_completed(
        &self,
        crawl_id: &str,
        pages_count: u32,
    ) -> Result<(), IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE crawls
            SET status = ?2, pages_count = ?3, finished_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(crawl_id)
        .bind(CrawlStatus::Completed.as_str())
        .bind(i64::from(pages_count))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Status(format!("mark completed: {err}")))?;

        if result.rows_affected() != 1 {
            return Err(IngestError::Status(format!("unknown crawl '{crawl_id}'")));
        }
        Ok(())
    }

    /// Finalizes a failed crawl with a human-readable error message.
    #[instrument(skip(self, error))]
    pub async fn mark_failed(&self, crawl_id: &str, error: &str) -> Result<(), IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE crawls
            SET status = ?2, error = ?3, finished_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(crawl_id)
        .bind(CrawlStatus::Failed.as_str())
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|err| IngestError::Status(format!("mark failed: {err}")))?;

        if result.rows_affected() != 1 {
            return Err(IngestError::Status(format!("unknown crawl '{crawl_id}'")));
        }
        Ok(())
    }

    pub async fn get_crawl(&self, crawl_id: &str) -> Result<CrawlRecord, IngestError> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, status, pages_count, error, started_at, finished_at
            FROM crawls WHERE id = ?1
            "#,
        )
        .bind(crawl_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| IngestError::Status(format!("get crawl: {err}")))?
        .ok_or_else(|| IngestError::Status(format!("unknown crawl '{crawl_id}'")))?;

        let pages_count: Option<i64> = row
            .try_get("pages_count")
            .map_err(|err| IngestError::Status(format!("decode pages_count: {err}")))?;
        let error: Option<String> = row
            .try_get("error")
            .map_err(|err| IngestError::Status(format!("decode error: {err}")))?;

        Ok(CrawlRecord {
            id: get_text(&row, "id")?,
            project_id: get_text(&row, "project_id")?,
            status: CrawlStatus::parse(&get_text(&row, "status")?)?,
            pages_count: pages_count.map(|count| u32::try_from(count).unwrap_or(0)),
            error,
            started_at: get_instant(&row, "started_at")?,
            finished_at: get_instant(&row, "finished_at")?,
        })
    }
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore").finish()
    }
}

fn get_text(row: &SqliteRow, column: &str) -> Result<String, IngestError> {
    row.try_get(column)
        .map_err(|err| IngestError::Status(format!("decode {column}: {err}")))
}

fn get_instant(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, IngestError> {
    let millis: Option<i64> = row
        .try_get(column)
        .map_err(|err| IngestError::Status(format!("decode {column}: {err}")))?;
    Ok(millis.and_then(DateTime::from_timestamp_millis))
}
