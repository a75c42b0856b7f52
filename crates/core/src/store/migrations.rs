//! Durable store schema migrations.
//!
//! This is the SQL schema version of the database file. The cache data
//! version is a separate marker handled by the cache lifecycle.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// Schema steps in ascending version order.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_tables.sql"))];

/// Apply every schema step newer than the recorded version.
///
/// Each step runs in its own transaction together with its `_migrations`
/// row, so a failed step leaves the schema at the previous version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the step that failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
            let step = |conn: &mut tokio_rusqlite::rusqlite::Connection| -> tokio_rusqlite::rusqlite::Result<()> {
                let tx = conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                tx.commit()
            };
            step(conn).map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tracing::debug!(version, "applied store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(conn: &Connection, sql: &'static str) -> i64 {
        conn.call(move |conn| conn.query_row(sql, [], |row| row.get(0))).await.unwrap()
    }

    #[tokio::test]
    async fn test_creates_store_tables() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        let tables = count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('keyval', 'queues', 'caches')",
        )
        .await;
        assert_eq!(tables, 3);
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM _migrations").await, MIGRATIONS.len() as i64);
        assert_eq!(count(&conn, "SELECT MAX(version) FROM _migrations").await, 1);
    }
}
