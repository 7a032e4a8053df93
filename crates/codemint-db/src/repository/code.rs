//! # Issued Code Repository
//!
//! Lookups, soft deletion and reporting over issued codes.
//!
//! ## Soft Delete
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  soft_delete(code)                   (one write transaction)            │
//! │       │                                                                 │
//! │       ├── issued_codes.is_deleted = 1                                  │
//! │       └── owner link cleared (products.barcode_id / uln_code_id)       │
//! │                                                                         │
//! │  The row stays: full_code remains reserved forever and the sequence    │
//! │  is never handed back to the pool. The owner may get a new code.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::txn::WriteTx;
use codemint_core::{CodeReport, IdentifierKind, IssuedCode, PoolCodeCount};

/// Repository for issued code operations.
#[derive(Debug, Clone)]
pub struct CodeRepository {
    pool: SqlitePool,
}

impl CodeRepository {
    /// Creates a new CodeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CodeRepository { pool }
    }

    /// Gets a code by its ID, deleted or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<IssuedCode>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_by_id_in(&mut conn, id).await
    }

    /// Finds a live code by its full digits.
    pub async fn find_by_code(
        &self,
        kind: IdentifierKind,
        full_code: &str,
    ) -> DbResult<Option<IssuedCode>> {
        let code = sqlx::query_as::<_, IssuedCode>(
            r#"
            SELECT
                id, kind, owner_id, pool_id, sequence_slice, full_code,
                is_deleted, created_at, updated_at
            FROM issued_codes
            WHERE kind = ?1 AND full_code = ?2 AND is_deleted = 0
            "#,
        )
        .bind(kind)
        .bind(full_code.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// The owner's live code of this kind, if any.
    pub async fn find_by_owner(
        &self,
        kind: IdentifierKind,
        owner_id: &str,
    ) -> DbResult<Option<IssuedCode>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_live_for_owner_in(&mut conn, kind, owner_id).await
    }

    /// Every code drawn from a pool, soft-deleted ones included, in
    /// sequence order.
    pub async fn list_by_pool(&self, pool_id: &str) -> DbResult<Vec<IssuedCode>> {
        let codes = sqlx::query_as::<_, IssuedCode>(
            r#"
            SELECT
                id, kind, owner_id, pool_id, sequence_slice, full_code,
                is_deleted, created_at, updated_at
            FROM issued_codes
            WHERE pool_id = ?1
            ORDER BY sequence_slice
            "#,
        )
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    /// Retires a code and frees its owner for a new one.
    ///
    /// Idempotent: deleting an already deleted code returns it unchanged.
    ///
    /// ## Returns
    /// * `Ok(IssuedCode)` - The code, now marked deleted
    /// * `Err(DbError::NotFound)` - No code with this ID
    pub async fn soft_delete(&self, code_id: &str) -> DbResult<IssuedCode> {
        let now = Utc::now();
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::soft_delete_in(tx.conn()?, code_id, now).await;
        let code = tx.finish(result).await?;

        info!(
            code_id = %code.id,
            full_code = %code.full_code,
            owner_id = %code.owner_id,
            "Code soft-deleted"
        );
        Ok(code)
    }

    async fn soft_delete_in(
        conn: &mut SqliteConnection,
        code_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<IssuedCode> {
        let mut code = Self::fetch_by_id_in(&mut *conn, code_id)
            .await?
            .ok_or_else(|| DbError::not_found("IssuedCode", code_id))?;

        if code.is_deleted {
            debug!(code_id = %code_id, "Code already deleted");
            return Ok(code);
        }

        sqlx::query("UPDATE issued_codes SET is_deleted = 1, updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(&code.id)
            .execute(&mut *conn)
            .await?;

        // Only clear the link if it still points at this code.
        let unlink = match code.kind {
            IdentifierKind::Barcode => {
                "UPDATE products SET barcode_id = NULL, updated_at = ?1 WHERE id = ?2 AND barcode_id = ?3"
            }
            IdentifierKind::Uln => {
                "UPDATE companies SET uln_code_id = NULL, updated_at = ?1 WHERE id = ?2 AND uln_code_id = ?3"
            }
        };
        sqlx::query(unlink)
            .bind(now)
            .bind(&code.owner_id)
            .bind(&code.id)
            .execute(&mut *conn)
            .await?;

        code.is_deleted = true;
        code.updated_at = now;
        Ok(code)
    }

    /// Totals for a kind, optionally narrowed to one company.
    ///
    /// For barcodes the company is the product's company; for ULNs it is
    /// the owner itself.
    pub async fn code_report(
        &self,
        kind: IdentifierKind,
        company_id: Option<&str>,
    ) -> DbResult<CodeReport> {
        let (total_codes, active_codes, deleted_codes): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(c.is_deleted = 0), 0),
                COALESCE(SUM(c.is_deleted = 1), 0)
            FROM issued_codes c
            LEFT JOIN products p ON c.kind = 'barcode' AND p.id = c.owner_id
            WHERE c.kind = ?1
            AND (?2 IS NULL OR COALESCE(p.company_id, c.owner_id) = ?2)
            "#,
        )
        .bind(kind)
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        let by_pool = sqlx::query_as::<_, PoolCodeCount>(
            r#"
            SELECT
                cp.id AS pool_id,
                cp.prefix_digits,
                cp.code_kind,
                COUNT(c.id) AS active_codes
            FROM issued_codes c
            INNER JOIN code_pools cp ON cp.id = c.pool_id
            LEFT JOIN products p ON c.kind = 'barcode' AND p.id = c.owner_id
            WHERE c.kind = ?1
            AND c.is_deleted = 0
            AND (?2 IS NULL OR COALESCE(p.company_id, c.owner_id) = ?2)
            GROUP BY cp.id, cp.prefix_digits, cp.code_kind
            ORDER BY cp.prefix_digits
            "#,
        )
        .bind(kind)
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(CodeReport {
            total_codes,
            active_codes,
            deleted_codes,
            by_pool,
        })
    }

    // =========================================================================
    // Transaction-scoped helpers
    // =========================================================================

    pub(crate) async fn fetch_by_id_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<IssuedCode>> {
        let code = sqlx::query_as::<_, IssuedCode>(
            r#"
            SELECT
                id, kind, owner_id, pool_id, sequence_slice, full_code,
                is_deleted, created_at, updated_at
            FROM issued_codes
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(code)
    }

    pub(crate) async fn fetch_live_for_owner_in(
        conn: &mut SqliteConnection,
        kind: IdentifierKind,
        owner_id: &str,
    ) -> DbResult<Option<IssuedCode>> {
        let code = sqlx::query_as::<_, IssuedCode>(
            r#"
            SELECT
                id, kind, owner_id, pool_id, sequence_slice, full_code,
                is_deleted, created_at, updated_at
            FROM issued_codes
            WHERE kind = ?1 AND owner_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(kind)
        .bind(owner_id)
        .fetch_optional(conn)
        .await?;

        Ok(code)
    }

    /// Inserts a code row. Constraint violations surface untranslated; the
    /// caller knows which invariant they mean.
    pub(crate) async fn insert_in(conn: &mut SqliteConnection, code: &IssuedCode) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO issued_codes (
                id, kind, owner_id, pool_id, sequence_slice, full_code,
                is_deleted, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&code.id)
        .bind(code.kind)
        .bind(&code.owner_id)
        .bind(&code.pool_id)
        .bind(&code.sequence_slice)
        .bind(&code.full_code)
        .bind(code.is_deleted)
        .bind(code.created_at)
        .bind(code.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }
}
