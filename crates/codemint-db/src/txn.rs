//! # Write Transactions
//!
//! Every unit of work that touches pool counters runs inside a
//! `BEGIN IMMEDIATE` transaction on a dedicated pooled connection.
//!
//! ## Why IMMEDIATE
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DEFERRED (sqlx default)             IMMEDIATE (this module)            │
//! │  ─────────────────────────           ─────────────────────────          │
//! │  A: BEGIN                            A: BEGIN IMMEDIATE  ← write lock   │
//! │  B: BEGIN                            B: BEGIN IMMEDIATE  ← waits        │
//! │  A: SELECT pool (used=4)             A: SELECT pool (used=4)            │
//! │  B: SELECT pool (used=4)             A: UPDATE used=5, COMMIT           │
//! │  A: UPDATE → lock upgrade            B: (wakes) SELECT pool (used=5)    │
//! │  B: UPDATE → SQLITE_BUSY             B: UPDATE used=6, COMMIT           │
//! │                                                                         │
//! │  Readers outside the transaction are never blocked (WAL mode).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! If the owning future is dropped mid-transaction the guard detaches its
//! connection from the pool. Closing the connection makes SQLite roll the
//! open transaction back, so no partial write ever becomes visible and the
//! pool never hands out a connection stuck inside a transaction.

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// An open `BEGIN IMMEDIATE` transaction.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = WriteTx::begin(&pool).await?;
/// let result = do_work(tx.conn()?).await;
/// tx.finish(result).await
/// ```
pub struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    /// Acquires a connection and takes the database write lock.
    ///
    /// Waits up to the configured busy timeout; lock contention past that
    /// surfaces as [`DbError::Conflict`].
    pub async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(WriteTx { conn: Some(conn) })
    }

    /// The connection to run statements on.
    pub fn conn(&mut self) -> DbResult<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| DbError::TransactionFailed("transaction already finished".to_string()))
    }

    /// Commits and returns the connection to the pool.
    ///
    /// A COMMIT refused for lock contention is [`DbError::Conflict`]; the
    /// transaction is rolled back either way.
    pub async fn commit(mut self) -> DbResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(DbError::TransactionFailed(
                "transaction already finished".to_string(),
            ));
        };

        if let Err(err) = sqlx::query("COMMIT").execute(&mut *conn).await {
            // Connection state is unknown after a failed COMMIT; never reuse it.
            drop(conn.detach());
            return Err(DbError::from(err));
        }
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err`, and hands the result through.
    pub async fn finish<T>(self, result: DbResult<T>) -> DbResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                self.rollback().await;
                Err(err)
            }
        }
    }

    /// Rolls back and returns the connection to the pool.
    ///
    /// Rollback failures are logged, never returned: the caller is already
    /// propagating the error that caused the rollback.
    pub async fn rollback(mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        match sqlx::query("ROLLBACK").execute(&mut *conn).await {
            Ok(_) => debug!("Write transaction rolled back"),
            Err(err) => {
                warn!(error = %err, "Rollback failed, discarding connection");
                drop(conn.detach());
            }
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Write transaction dropped while open, discarding connection");
            drop(conn.detach());
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::time::Duration;

    async fn file_db(dir: &tempfile::TempDir) -> Database {
        let config = DbConfig::new(dir.path().join("txn.db")).max_connections(2);
        Database::new(config).await.unwrap()
    }

    async fn company_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM companies")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    async fn insert_company(conn: &mut SqliteConnection, id: &str) {
        sqlx::query(
            "INSERT INTO companies (id, name, created_at, updated_at) \
             VALUES (?, 'Acme', datetime('now'), datetime('now'))",
        )
        .bind(id)
        .execute(conn)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_db(&dir).await;

        let mut tx = WriteTx::begin(db.pool()).await.unwrap();
        insert_company(tx.conn().unwrap(), "c-1").await;
        tx.commit().await.unwrap();

        assert_eq!(company_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_db(&dir).await;

        let mut tx = WriteTx::begin(db.pool()).await.unwrap();
        insert_company(tx.conn().unwrap(), "c-1").await;
        tx.rollback().await;

        assert_eq!(company_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_db(&dir).await;

        {
            let mut tx = WriteTx::begin(db.pool()).await.unwrap();
            insert_company(tx.conn().unwrap(), "c-1").await;
            // dropped without commit, as a cancelled caller would
        }

        assert_eq!(company_count(&db).await, 0);

        // The write lock was released with the discarded connection.
        let mut tx = WriteTx::begin(db.pool()).await.unwrap();
        insert_company(tx.conn().unwrap(), "c-2").await;
        tx.commit().await.unwrap();
        assert_eq!(company_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_commit_blocked_by_reader_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        // Rollback journal: COMMIT needs every reader gone.
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("busy.db"))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(Duration::ZERO);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (id TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let mut reader = pool.acquire().await.unwrap();
        sqlx::query("BEGIN").execute(&mut *reader).await.unwrap();
        sqlx::query("SELECT COUNT(*) FROM t")
            .fetch_one(&mut *reader)
            .await
            .unwrap();

        let mut tx = WriteTx::begin(&pool).await.unwrap();
        sqlx::query("INSERT INTO t (id) VALUES ('a')")
            .execute(tx.conn().unwrap())
            .await
            .unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)), "got {err:?}");
        assert!(err.is_retryable());

        sqlx::query("COMMIT").execute(&mut *reader).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&mut *reader)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
