//! Shared SQLite pool setup.

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::instrument;

use crate::types::IngestError;

/// Connects (or creates) the SQLite database at `database_url` and applies
/// embedded migrations. Example URL: `sqlite://crawldex.db?mode=rwc`.
///
/// The returned pool backs both the job queue and the status records; both
/// sides take it in their constructors (no global connection state).
#[instrument(skip(database_url))]
pub async fn connect(database_url: &str) -> Result<SqlitePool, IngestError> {
    // An in-memory SQLite database exists per connection; pin the pool to a
    // single persistent connection so all callers see the same data.
    let options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
    };

    let pool = options
        .connect(database_url)
        .await
        .map_err(|err| IngestError::Queue(format!("connect error: {err}")))?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| IngestError::Queue(format!("migration failure: {err}")))?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn file_backed_database_persists_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("crawldex.db").display()
        );

        let pool = connect(&url).await.unwrap();
        sqlx::query("INSERT INTO projects (id, status, namespace) VALUES ('p1', 'CREATING', 'ns')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        // Reconnect re-applies migrations (a no-op) and sees the same rows.
        let pool = connect(&url).await.unwrap();
        let row = sqlx::query("SELECT namespace FROM projects WHERE id = 'p1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let namespace: String = row.try_get("namespace").unwrap();
        assert_eq!(namespace, "ns");
    }
}
