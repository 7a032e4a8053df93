//! # Prefix Pool Repository
//!
//! Registration, activation and capacity reporting for prefix pools.
//!
//! ## Pool Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pool Lifecycle                                   │
//! │                                                                         │
//! │  create("1234", UPI13)                                                 │
//! │       │   capacity = 99_999_999, used = 0, next = 1, inactive          │
//! │       ▼                                                                 │
//! │  activate(pool, scope) ── deactivates the scope's previous pool        │
//! │       │                   in the same write transaction                │
//! │       ▼                                                                 │
//! │  issuance draws sequences 1, 2, 3 ... capacity                         │
//! │       │                                                                 │
//! │       ├── deactivate(pool)  ← admin switch-off, counters kept          │
//! │       └── delete(pool)      ← only while used_count == 0               │
//! │                                                                         │
//! │  Scope                                                                  │
//! │  ──────                                                                 │
//! │  barcode pools: company-scoped or global (scope_id NULL)               │
//! │  ULN pools:     global only                                            │
//! │  one active pool per (kind, scope), enforced by a unique index         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::txn::WriteTx;
use codemint_core::capacity::PoolSpec;
use codemint_core::{
    Allocation, CodeKind, CodePool, IdentifierKind, IssuanceError, PoolCapacity,
};

/// Repository for prefix pool operations.
///
/// ## Usage
/// ```rust,ignore
/// let pools = db.pools();
///
/// let pool = pools
///     .create(IdentifierKind::Barcode, "1234", CodeKind::Upi13, None)
///     .await?;
/// pools.activate(&pool.id, None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PoolRepository {
    pool: SqlitePool,
}

impl PoolRepository {
    /// Creates a new PoolRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PoolRepository { pool }
    }

    /// Registers a new, inactive pool.
    ///
    /// ## Returns
    /// * `Ok(CodePool)` - Pool with derived capacity, `used_count = 0`, `next_sequence = 1`
    /// * `Err(InvalidConfiguration)` - Prefix/code kind has no capacity, or scoped ULN pool
    /// * `Err(PrefixTaken)` - Prefix already registered for this kind
    /// * `Err(DbError::NotFound)` - Scope company does not exist
    pub async fn create(
        &self,
        kind: IdentifierKind,
        prefix_digits: &str,
        code_kind: CodeKind,
        scope_id: Option<&str>,
    ) -> DbResult<CodePool> {
        let spec = PoolSpec::new(kind, prefix_digits, code_kind, scope_id)?;

        let now = Utc::now();
        let pool = CodePool {
            id: Uuid::new_v4().to_string(),
            kind: spec.kind,
            scope_id: spec.scope_id,
            prefix_digits: spec.prefix_digits,
            code_kind: spec.code_kind,
            is_active: false,
            capacity: spec.capacity,
            used_count: 0,
            next_sequence: 1,
            created_at: now,
            updated_at: now,
        };

        debug!(prefix = %pool.prefix_digits, kind = ?kind, "Inserting pool");

        sqlx::query(
            r#"
            INSERT INTO code_pools (
                id, kind, scope_id, prefix_digits, code_kind,
                is_active, capacity, used_count, next_sequence,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&pool.id)
        .bind(pool.kind)
        .bind(&pool.scope_id)
        .bind(&pool.prefix_digits)
        .bind(pool.code_kind)
        .bind(pool.is_active)
        .bind(pool.capacity)
        .bind(pool.used_count)
        .bind(pool.next_sequence)
        .bind(pool.created_at)
        .bind(pool.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match DbError::from(err) {
            DbError::UniqueViolation { field, .. } if field.contains("prefix_digits") => {
                IssuanceError::PrefixTaken {
                    kind,
                    prefix: pool.prefix_digits.clone(),
                }
                .into()
            }
            DbError::ForeignKeyViolation { .. } => {
                DbError::not_found("Company", scope_id.unwrap_or_default())
            }
            other => other,
        })?;

        info!(
            pool_id = %pool.id,
            prefix = %pool.prefix_digits,
            code_kind = ?pool.code_kind,
            capacity = pool.capacity,
            "Pool created"
        );

        Ok(pool)
    }

    /// Makes `pool_id` the single active pool of its (kind, scope).
    ///
    /// Deactivating the previous pool and activating this one happen in one
    /// write transaction: no reader ever sees two active pools, or none
    /// where one was active before.
    ///
    /// ## Arguments
    /// * `scope_id` - When given, the pool must belong to this company;
    ///   `None` accepts the pool's own scope
    pub async fn activate(&self, pool_id: &str, scope_id: Option<&str>) -> DbResult<CodePool> {
        let now = Utc::now();
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::activate_in(tx.conn()?, pool_id, scope_id, now).await;
        let pool = tx.finish(result).await?;

        info!(pool_id = %pool.id, scope_id = ?pool.scope_id, "Pool activated");
        Ok(pool)
    }

    async fn activate_in(
        conn: &mut SqliteConnection,
        pool_id: &str,
        scope_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<CodePool> {
        let mut pool = Self::fetch_by_id_in(&mut *conn, pool_id)
            .await?
            .ok_or_else(|| IssuanceError::PoolNotFound(pool_id.to_string()))?;

        if let Some(scope) = scope_id {
            if pool.scope_id.as_deref() != Some(scope) {
                return Err(IssuanceError::PoolNotFound(pool_id.to_string()).into());
            }
        }

        if pool.is_active {
            return Ok(pool);
        }

        let deactivated = sqlx::query(
            r#"
            UPDATE code_pools
            SET is_active = 0, updated_at = ?1
            WHERE kind = ?2 AND scope_id IS ?3 AND is_active = 1 AND id != ?4
            "#,
        )
        .bind(now)
        .bind(pool.kind)
        .bind(&pool.scope_id)
        .bind(&pool.id)
        .execute(&mut *conn)
        .await?;

        debug!(
            pool_id = %pool.id,
            deactivated = deactivated.rows_affected(),
            "Previous active pool switched off"
        );

        sqlx::query("UPDATE code_pools SET is_active = 1, updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(&pool.id)
            .execute(&mut *conn)
            .await?;

        pool.is_active = true;
        pool.updated_at = now;
        Ok(pool)
    }

    /// Switches a pool off. Counters are kept; the pool can be re-activated.
    pub async fn deactivate(&self, pool_id: &str) -> DbResult<CodePool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE code_pools SET is_active = 0, updated_at = ?1 WHERE id = ?2",
        )
        .bind(now)
        .bind(pool_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IssuanceError::PoolNotFound(pool_id.to_string()).into());
        }

        info!(pool_id = %pool_id, "Pool deactivated");

        self.get_by_id(pool_id)
            .await?
            .ok_or_else(|| IssuanceError::PoolNotFound(pool_id.to_string()).into())
    }

    /// Deletes a pool that has never issued a code.
    ///
    /// ## Returns
    /// * `Err(PoolInUse)` - The pool has issued codes; it is kept forever
    ///   so every code can be traced back to its prefix
    pub async fn delete(&self, pool_id: &str) -> DbResult<()> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::delete_in(tx.conn()?, pool_id).await;
        tx.finish(result).await?;

        info!(pool_id = %pool_id, "Pool deleted");
        Ok(())
    }

    async fn delete_in(conn: &mut SqliteConnection, pool_id: &str) -> DbResult<()> {
        let pool = Self::fetch_by_id_in(&mut *conn, pool_id)
            .await?
            .ok_or_else(|| IssuanceError::PoolNotFound(pool_id.to_string()))?;

        if pool.used_count > 0 {
            return Err(IssuanceError::PoolInUse {
                pool_id: pool.id,
                used_count: pool.used_count,
            }
            .into());
        }

        sqlx::query("DELETE FROM code_pools WHERE id = ?1")
            .bind(pool_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Gets a pool by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CodePool>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_by_id_in(&mut conn, id).await
    }

    /// The active pool for (kind, scope). `None` scope is the global pool.
    ///
    /// No fallback: a company without its own active pool returns `None`
    /// here even when a global pool is active.
    pub async fn get_active(
        &self,
        kind: IdentifierKind,
        scope_id: Option<&str>,
    ) -> DbResult<Option<CodePool>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_active_in(&mut conn, kind, scope_id).await
    }

    /// Lists pools, oldest first.
    ///
    /// `None` filters match everything; `scope_id = None` therefore lists
    /// global and company pools alike.
    pub async fn list(
        &self,
        kind: Option<IdentifierKind>,
        scope_id: Option<&str>,
    ) -> DbResult<Vec<CodePool>> {
        let pools = sqlx::query_as::<_, CodePool>(
            r#"
            SELECT
                id, kind, scope_id, prefix_digits, code_kind,
                is_active, capacity, used_count, next_sequence,
                created_at, updated_at
            FROM code_pools
            WHERE (?1 IS NULL OR kind = ?1)
            AND (?2 IS NULL OR scope_id = ?2)
            ORDER BY created_at, prefix_digits
            "#,
        )
        .bind(kind)
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(pools)
    }

    /// Finds the pool registered with `prefix_digits` for a kind.
    pub async fn find_by_prefix(
        &self,
        kind: IdentifierKind,
        prefix_digits: &str,
    ) -> DbResult<Option<CodePool>> {
        let pool = sqlx::query_as::<_, CodePool>(
            r#"
            SELECT
                id, kind, scope_id, prefix_digits, code_kind,
                is_active, capacity, used_count, next_sequence,
                created_at, updated_at
            FROM code_pools
            WHERE kind = ?1 AND prefix_digits = ?2
            "#,
        )
        .bind(kind)
        .bind(prefix_digits.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(pool)
    }

    /// Whether a prefix is already registered for a kind.
    pub async fn prefix_exists(&self, kind: IdentifierKind, prefix_digits: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM code_pools WHERE kind = ?1 AND prefix_digits = ?2)",
        )
        .bind(kind)
        .bind(prefix_digits.trim())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Codes a pool can still issue, read fresh from storage.
    pub async fn remaining_capacity(&self, pool_id: &str) -> DbResult<i64> {
        let pool = self
            .get_by_id(pool_id)
            .await?
            .ok_or_else(|| IssuanceError::PoolNotFound(pool_id.to_string()))?;
        Ok(pool.remaining_capacity())
    }

    /// Remaining capacity and utilization per pool.
    ///
    /// ## Example Output
    /// ```text
    /// prefix    kind    capacity     used   remaining   utilization
    /// 1234      UPI13   99_999_999   1_200  99_998_799  0.0012%
    /// 12345     UPI7    9            9      0           100%
    /// ```
    pub async fn capacity_report(
        &self,
        kind: IdentifierKind,
        scope_id: Option<&str>,
    ) -> DbResult<Vec<PoolCapacity>> {
        let pools = self.list(Some(kind), scope_id).await?;
        Ok(pools.into_iter().map(PoolCapacity::from).collect())
    }

    // =========================================================================
    // Transaction-scoped helpers
    // =========================================================================

    pub(crate) async fn fetch_by_id_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CodePool>> {
        let pool = sqlx::query_as::<_, CodePool>(
            r#"
            SELECT
                id, kind, scope_id, prefix_digits, code_kind,
                is_active, capacity, used_count, next_sequence,
                created_at, updated_at
            FROM code_pools
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(pool)
    }

    pub(crate) async fn fetch_active_in(
        conn: &mut SqliteConnection,
        kind: IdentifierKind,
        scope_id: Option<&str>,
    ) -> DbResult<Option<CodePool>> {
        let pool = sqlx::query_as::<_, CodePool>(
            r#"
            SELECT
                id, kind, scope_id, prefix_digits, code_kind,
                is_active, capacity, used_count, next_sequence,
                created_at, updated_at
            FROM code_pools
            WHERE kind = ?1 AND scope_id IS ?2 AND is_active = 1
            "#,
        )
        .bind(kind)
        .bind(scope_id)
        .fetch_optional(conn)
        .await?;

        Ok(pool)
    }

    /// Persists the counters of an allocation.
    ///
    /// Compare-and-set on the counters read at allocation time: if anything
    /// moved them in between, nothing is written and the caller gets a
    /// retryable [`DbError::Conflict`].
    pub(crate) async fn advance_counters_in(
        conn: &mut SqliteConnection,
        allocation: &Allocation,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let updated = &allocation.updated_pool;

        let result = sqlx::query(
            r#"
            UPDATE code_pools
            SET used_count = ?1, next_sequence = ?2, updated_at = ?3
            WHERE id = ?4 AND used_count = ?5 AND next_sequence = ?6
            "#,
        )
        .bind(updated.used_count)
        .bind(updated.next_sequence)
        .bind(now)
        .bind(&updated.id)
        .bind(updated.used_count - 1)
        .bind(allocation.sequence)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "pool {} counters changed during allocation",
                updated.id
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
