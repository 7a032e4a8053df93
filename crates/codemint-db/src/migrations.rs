//! # Database Migrations
//!
//! Embedded SQL migrations for the issuance schema.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  Database::new (run_migrations = true)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Check _sqlx_migrations table                                          │
//! │       │                                                                 │
//! │       ├── Table doesn't exist? Create it                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Compare embedded migrations vs applied                                │
//! │       │                                                                 │
//! │       ├── 001_issuance_schema.sql ✓ (already applied)                 │
//! │       └── 002_....sql             ⬜ (NEW - needs to run)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Run pending migrations in order                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Record in _sqlx_migrations                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Pool handed to repositories                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `002_add_pool_labels.sql`)
//! 3. Write idempotent SQL (use `IF NOT EXISTS` where possible)
//! 4. **NEVER** modify existing migrations - always add new ones
//! 5. Never relax the uniqueness indexes on `code_pools` / `issued_codes`

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// The issuance schema, compiled into the binary.
///
/// ```text
/// migrations/sqlite/
/// └── 001_issuance_schema.sql   companies, products, code_pools, issued_codes
///                               + one-active-pool and live-link indexes
/// ```
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Brings the schema up to date before any repository touches it.
///
/// Called from [`Database::new`](crate::pool::Database::new) unless
/// `run_migrations` is off. Each pending file runs in its own transaction,
/// so a failure leaves the pool and code tables at the last good version.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns information about migrations.
///
/// ## Returns
/// Tuple of (total_migrations, applied_migrations)
///
/// ## Usage
/// For diagnostics and health checks.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 =
        match sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
        {
            Ok(count) => count,
            // Table is missing until the first run
            Err(sqlx::Error::Database(err)) if err.message().contains("no such table") => 0,
            Err(err) => return Err(err.into()),
        };

    Ok((total, applied as usize))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    async fn insert_pool(pool: &SqlitePool, id: &str, prefix: &str, active: bool) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO code_pools (
                id, kind, scope_id, prefix_digits, code_kind, is_active,
                capacity, used_count, next_sequence, created_at, updated_at
            ) VALUES (?1, 'barcode', NULL, ?2, 'UPI13', ?3, 99999999, 0, 1,
                      datetime('now'), datetime('now'))
            "#,
        )
        .bind(id)
        .bind(prefix)
        .bind(active)
        .execute(pool)
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        run_migrations(db.pool()).await.unwrap();

        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_status_before_first_run() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert!(total >= 1);
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn test_status_reports_storage_errors() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.pool().close().await;

        assert!(migration_status(db.pool()).await.is_err());
    }

    #[tokio::test]
    async fn test_schema_allows_one_active_pool_per_scope() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        insert_pool(db.pool(), "a", "1234", true).await.unwrap();
        insert_pool(db.pool(), "b", "5678", false).await.unwrap();

        let err = insert_pool(db.pool(), "c", "9012", true).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_schema_rejects_counter_drift() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        insert_pool(db.pool(), "a", "1234", false).await.unwrap();

        let err = sqlx::query("UPDATE code_pools SET used_count = used_count + 1 WHERE id = 'a'")
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(DbError::from(err).to_string().contains("CHECK"));
    }
}
