//! # Issuance Service
//!
//! Assigns one code to one owner as a single write transaction.
//!
//! ## Assignment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  assign_code(kind, owner_id)               BEGIN IMMEDIATE              │
//! │       │                                                                 │
//! │  1.   ├── load owner ─────────────────────► OwnerNotFound               │
//! │  2.   ├── owner has live code? ───────────► AlreadyAssigned             │
//! │  3.   ├── resolve active pool ────────────► NoActivePool                │
//! │       │     barcode: company pool, then global pool                     │
//! │       │     ULN:     global pool                                        │
//! │  4.   ├── allocate + CAS counter update ──► CapacityExhausted           │
//! │       │                                     SequenceOverflow  (fault)   │
//! │       │                                     CorruptCounters   (fault)   │
//! │  5.   ├── prefix + sequence + check digit                               │
//! │  6.   ├── insert issued code ─────────────► DuplicateCode     (fault)   │
//! │  7.   ├── link owner → code                                             │
//! │  8.   └── COMMIT                                                        │
//! │                                                                         │
//! │  Any error: ROLLBACK. Pool counters, code row and owner link are       │
//! │  written together or not at all.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine never retries. A `StorageConflict` (lock wait exceeded, lost
//! counter race) is handed back for the caller to re-run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::code::CodeRepository;
use crate::repository::owner::OwnerRepository;
use crate::repository::pool::PoolRepository;
use crate::txn::WriteTx;
use codemint_core::error::ValidationError;
use codemint_core::sequence::{allocate, build_full_code};
use codemint_core::{
    AssignedCode, AssignmentStage, BulkAssignment, CheckDigit, CodePool, FailedAssignment,
    FailureKind, IdentifierKind, IssuanceError, IssuedCode, MAX_BULK_ITEMS,
};

/// Transactional code assignment.
///
/// ## Usage
/// ```rust,ignore
/// let issuance = db.issuance();
///
/// let barcode = issuance.assign_barcode(&product.id).await?;
/// let uln = issuance.assign_uln(&company.id).await?;
/// ```
#[derive(Clone)]
pub struct IssuanceService {
    pool: SqlitePool,
    checksum: Arc<dyn CheckDigit>,
}

impl IssuanceService {
    /// Creates a service drawing check digits from `checksum`.
    pub fn new(pool: SqlitePool, checksum: Arc<dyn CheckDigit>) -> Self {
        IssuanceService { pool, checksum }
    }

    /// Assigns a barcode to a product.
    pub async fn assign_barcode(&self, product_id: &str) -> DbResult<IssuedCode> {
        self.assign_code(IdentifierKind::Barcode, product_id).await
    }

    /// Assigns a ULN to a company.
    pub async fn assign_uln(&self, company_id: &str) -> DbResult<IssuedCode> {
        self.assign_code(IdentifierKind::Uln, company_id).await
    }

    /// Issues the next code of `kind` to `owner_id`.
    ///
    /// The pool scope comes from the owner: a product's company for
    /// barcodes, the global pool for ULNs.
    pub async fn assign_code(&self, kind: IdentifierKind, owner_id: &str) -> DbResult<IssuedCode> {
        let mut stage = AssignmentStage::Started;
        let now = Utc::now();

        let mut tx = match WriteTx::begin(&self.pool).await {
            Ok(tx) => tx,
            Err(err) => {
                log_failure(kind, owner_id, stage, &err);
                return Err(err);
            }
        };

        let result = match tx.conn() {
            Ok(conn) => self.assign_in(conn, kind, owner_id, now, &mut stage).await,
            Err(err) => Err(err),
        };

        match tx.finish(result).await {
            Ok(code) => {
                info!(
                    kind = ?kind,
                    owner_id = %owner_id,
                    pool_id = %code.pool_id,
                    full_code = %code.full_code,
                    stage = ?AssignmentStage::Committed,
                    "Code issued"
                );
                Ok(code)
            }
            Err(err) => {
                log_failure(kind, owner_id, stage, &err);
                Err(err)
            }
        }
    }

    async fn assign_in(
        &self,
        conn: &mut SqliteConnection,
        kind: IdentifierKind,
        owner_id: &str,
        now: DateTime<Utc>,
        stage: &mut AssignmentStage,
    ) -> DbResult<IssuedCode> {
        // 1. Owner, and the company scope it draws from
        let scope_id = match kind {
            IdentifierKind::Barcode => OwnerRepository::fetch_product_in(&mut *conn, owner_id)
                .await?
                .map(|product| Some(product.company_id)),
            IdentifierKind::Uln => OwnerRepository::fetch_company_in(&mut *conn, owner_id)
                .await?
                .map(|_| None),
        }
        .ok_or_else(|| IssuanceError::OwnerNotFound {
            kind,
            owner_id: owner_id.to_string(),
        })?;

        // 2. One live code per owner
        if let Some(existing) =
            CodeRepository::fetch_live_for_owner_in(&mut *conn, kind, owner_id).await?
        {
            return Err(IssuanceError::AlreadyAssigned {
                kind,
                owner_id: owner_id.to_string(),
                existing_code: existing.full_code,
            }
            .into());
        }

        // 3. Active pool
        let pool = resolve_pool(&mut *conn, kind, scope_id.as_deref())
            .await?
            .ok_or_else(|| IssuanceError::NoActivePool {
                kind,
                scope_id: scope_id.clone(),
            })?;
        *stage = AssignmentStage::PoolResolved;
        debug!(pool_id = %pool.id, prefix = %pool.prefix_digits, "Pool resolved");

        // 4. Sequence
        let allocation = allocate(&pool)?;
        PoolRepository::advance_counters_in(&mut *conn, &allocation, now).await?;
        *stage = AssignmentStage::SequenceAllocated;

        // 5. Check digit
        let full_code = build_full_code(
            self.checksum.as_ref(),
            &pool.prefix_digits,
            &allocation.padded_sequence,
        )?;
        *stage = AssignmentStage::ChecksumComputed;

        // 6. Code row
        let code = IssuedCode {
            id: Uuid::new_v4().to_string(),
            kind,
            owner_id: owner_id.to_string(),
            pool_id: pool.id.clone(),
            sequence_slice: allocation.padded_sequence,
            full_code,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        CodeRepository::insert_in(&mut *conn, &code)
            .await
            .map_err(|err| match err {
                DbError::UniqueViolation { ref field, .. } if field.contains("full_code") => {
                    IssuanceError::DuplicateCode {
                        full_code: code.full_code.clone(),
                    }
                    .into()
                }
                other => other,
            })?;
        *stage = AssignmentStage::Persisted;

        // 7. Owner link
        OwnerRepository::set_code_link_in(&mut *conn, kind, owner_id, &code.id, now).await?;
        *stage = AssignmentStage::Linked;

        Ok(code)
    }

    /// Assigns codes to many owners. Items are independent: a failure is
    /// recorded with its kind and the run continues.
    ///
    /// ## Returns
    /// * `Err(InvalidInput)` - More than [`MAX_BULK_ITEMS`] owners; nothing is assigned
    pub async fn bulk_assign(
        &self,
        kind: IdentifierKind,
        owner_ids: &[String],
    ) -> DbResult<BulkAssignment> {
        if owner_ids.len() > MAX_BULK_ITEMS {
            return Err(IssuanceError::from(ValidationError::TooMany {
                field: "owner_ids".to_string(),
                max: MAX_BULK_ITEMS,
            })
            .into());
        }

        info!(kind = ?kind, count = owner_ids.len(), "Starting bulk assignment");

        let mut outcome = BulkAssignment::default();
        for owner_id in owner_ids {
            match self.assign_code(kind, owner_id).await {
                Ok(code) => outcome.succeeded.push(AssignedCode {
                    owner_id: owner_id.clone(),
                    full_code: code.full_code,
                }),
                Err(err) => outcome.failed.push(FailedAssignment {
                    owner_id: owner_id.clone(),
                    reason: err.kind(),
                }),
            }
        }

        info!(
            kind = ?kind,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Bulk assignment finished"
        );
        Ok(outcome)
    }
}

/// Company pool first, then the global pool (barcodes only).
async fn resolve_pool(
    conn: &mut SqliteConnection,
    kind: IdentifierKind,
    scope_id: Option<&str>,
) -> DbResult<Option<CodePool>> {
    if let Some(scope) = scope_id {
        if let Some(pool) = PoolRepository::fetch_active_in(&mut *conn, kind, Some(scope)).await? {
            return Ok(Some(pool));
        }
    }
    PoolRepository::fetch_active_in(conn, kind, None).await
}

fn log_failure(kind: IdentifierKind, owner_id: &str, stage: AssignmentStage, err: &DbError) {
    let failure = err.kind();

    if failure.is_integrity_fault() {
        error!(
            integrity = true,
            kind = ?kind,
            owner_id = %owner_id,
            stage = ?stage,
            failure = ?failure,
            error = %err,
            "Issuance invariant violated, rolled back"
        );
    } else if matches!(failure, FailureKind::Storage | FailureKind::StorageConflict) {
        warn!(
            kind = ?kind,
            owner_id = %owner_id,
            stage = ?stage,
            failure = ?failure,
            error = %err,
            "Issuance storage failure, rolled back"
        );
    } else {
        debug!(
            kind = ?kind,
            owner_id = %owner_id,
            stage = ?stage,
            failure = ?failure,
            "Issuance refused"
        );
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use codemint_core::checksum::check_digit;
    use codemint_core::{CodeKind, Company, Product};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn active_pool(
        db: &Database,
        kind: IdentifierKind,
        prefix: &str,
        code_kind: CodeKind,
        scope_id: Option<&str>,
    ) -> CodePool {
        let pool = db.pools().create(kind, prefix, code_kind, scope_id).await.unwrap();
        db.pools().activate(&pool.id, scope_id).await.unwrap()
    }

    async fn company_with_product(db: &Database) -> (Company, Product) {
        let company = db.owners().create_company("Acme").await.unwrap();
        let product = db.owners().create_product(&company.id, "Widget").await.unwrap();
        (company, product)
    }

    async fn used_count(db: &Database, pool_id: &str) -> i64 {
        db.pools().get_by_id(pool_id).await.unwrap().unwrap().used_count
    }

    #[tokio::test]
    async fn test_first_barcode() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let (_, product) = company_with_product(&db).await;

        let code = db.issuance().assign_barcode(&product.id).await.unwrap();

        assert_eq!(code.sequence_slice, "00000001");
        let expected = format!("123400000001{}", check_digit("123400000001").unwrap());
        assert_eq!(code.full_code, expected);
        assert_eq!(code.full_code, "1234000000015");
        assert_eq!(code.pool_id, pool.id);

        let pool = db.pools().get_by_id(&pool.id).await.unwrap().unwrap();
        assert_eq!(pool.used_count, 1);
        assert_eq!(pool.next_sequence, 2);

        let product = db.owners().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(product.barcode_id.as_deref(), Some(code.id.as_str()));
    }

    #[tokio::test]
    async fn test_second_assignment_is_refused() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let (_, product) = company_with_product(&db).await;
        let issuance = db.issuance();

        let first = issuance.assign_barcode(&product.id).await.unwrap();
        let err = issuance.assign_barcode(&product.id).await.unwrap_err();

        match err {
            DbError::Issuance(IssuanceError::AlreadyAssigned { existing_code, .. }) => {
                assert_eq!(existing_code, first.full_code)
            }
            other => panic!("expected AlreadyAssigned, got {other:?}"),
        }
        assert_eq!(used_count(&db, &pool.id).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_owner() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;

        let err = db.issuance().assign_barcode("no-such-product").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::OwnerNotFound);

        // A company id is not a product id.
        let company = db.owners().create_company("Acme").await.unwrap();
        let err = db.issuance().assign_barcode(&company.id).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::OwnerNotFound);

        assert_eq!(used_count(&db, &pool.id).await, 0);
    }

    #[tokio::test]
    async fn test_no_active_pool() {
        let db = test_db().await;
        let (company, product) = company_with_product(&db).await;
        db.pools()
            .create(IdentifierKind::Barcode, "1234", CodeKind::Upi13, None)
            .await
            .unwrap();

        let err = db.issuance().assign_barcode(&product.id).await.unwrap_err();
        match err {
            DbError::Issuance(IssuanceError::NoActivePool { kind, scope_id }) => {
                assert_eq!(kind, IdentifierKind::Barcode);
                assert_eq!(scope_id, Some(company.id));
            }
            other => panic!("expected NoActivePool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_company_pool_preferred_over_global() {
        let db = test_db().await;
        let (company, product) = company_with_product(&db).await;
        let other = db.owners().create_company("Globex").await.unwrap();
        let other_product = db.owners().create_product(&other.id, "Gadget").await.unwrap();

        let global = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let scoped = active_pool(
            &db,
            IdentifierKind::Barcode,
            "5678",
            CodeKind::Upi13,
            Some(&company.id),
        )
        .await;

        let issuance = db.issuance();
        let own = issuance.assign_barcode(&product.id).await.unwrap();
        let fallback = issuance.assign_barcode(&other_product.id).await.unwrap();

        assert_eq!(own.pool_id, scoped.id);
        assert!(own.full_code.starts_with("5678"));
        assert_eq!(fallback.pool_id, global.id);
        assert!(fallback.full_code.starts_with("1234"));
    }

    #[tokio::test]
    async fn test_uln_from_global_pool() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Uln, "9876", CodeKind::Upi11, None).await;
        let company = db.owners().create_company("Acme").await.unwrap();

        let code = db.issuance().assign_uln(&company.id).await.unwrap();
        assert_eq!(code.kind, IdentifierKind::Uln);
        assert_eq!(code.full_code.len(), 11);
        assert_eq!(code.sequence_slice, "000001");
        assert_eq!(code.pool_id, pool.id);

        let company = db.owners().get_company(&company.id).await.unwrap().unwrap();
        assert_eq!(company.uln_code_id, Some(code.id));
    }

    #[tokio::test]
    async fn test_capacity_exhaustion() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Barcode, "12345", CodeKind::Upi7, None).await;
        assert_eq!(pool.capacity, 9);

        let company = db.owners().create_company("Acme").await.unwrap();
        let issuance = db.issuance();

        for expected in 1..=9 {
            let product = db
                .owners()
                .create_product(&company.id, &format!("P{expected}"))
                .await
                .unwrap();
            let code = issuance.assign_barcode(&product.id).await.unwrap();
            assert_eq!(code.sequence_slice, expected.to_string());
        }

        let last = db.owners().create_product(&company.id, "P10").await.unwrap();
        let err = issuance.assign_barcode(&last.id).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::CapacityExhausted);
        assert!(!err.is_retryable());

        let pool = db.pools().get_by_id(&pool.id).await.unwrap().unwrap();
        assert_eq!(pool.used_count, 9);
        assert_eq!(db.pools().remaining_capacity(&pool.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_after_allocation_rolls_back_counters() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let (_, product) = company_with_product(&db).await;

        // The next code is already on record (retired), so the insert
        // after allocation must fail.
        sqlx::query(
            r#"
            INSERT INTO issued_codes (
                id, kind, owner_id, pool_id, sequence_slice, full_code,
                is_deleted, created_at, updated_at
            ) VALUES ('stale', 'barcode', 'someone-else', ?1, '00000001', '1234000000015',
                      1, datetime('now'), datetime('now'))
            "#,
        )
        .bind(&pool.id)
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.issuance().assign_barcode(&product.id).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::DuplicateCode);
        assert!(err.is_integrity_fault());

        let pool = db.pools().get_by_id(&pool.id).await.unwrap().unwrap();
        assert_eq!(pool.used_count, 0);
        assert_eq!(pool.next_sequence, 1);

        let product = db.owners().get_product(&product.id).await.unwrap().unwrap();
        assert!(product.barcode_id.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_then_reassign() {
        let db = test_db().await;
        let pool = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let (company, product) = company_with_product(&db).await;
        let issuance = db.issuance();
        let codes = db.codes();

        let first = issuance.assign_barcode(&product.id).await.unwrap();
        let deleted = codes.soft_delete(&first.id).await.unwrap();
        assert!(deleted.is_deleted);

        let unlinked = db.owners().get_product(&product.id).await.unwrap().unwrap();
        assert!(unlinked.barcode_id.is_none());
        assert!(codes
            .find_by_code(IdentifierKind::Barcode, &first.full_code)
            .await
            .unwrap()
            .is_none());

        // The retired sequence is never handed out again.
        let second = issuance.assign_barcode(&product.id).await.unwrap();
        assert_eq!(second.sequence_slice, "00000002");
        assert_ne!(second.full_code, first.full_code);

        let history = codes.list_by_pool(&pool.id).await.unwrap();
        assert_eq!(history.len(), 2);

        let report = codes
            .code_report(IdentifierKind::Barcode, Some(&company.id))
            .await
            .unwrap();
        assert_eq!(report.total_codes, 2);
        assert_eq!(report.active_codes, 1);
        assert_eq!(report.deleted_codes, 1);
        assert_eq!(report.by_pool.len(), 1);
        assert_eq!(report.by_pool[0].active_codes, 1);

        // Deleting twice is harmless.
        codes.soft_delete(&first.id).await.unwrap();
        let err = codes.soft_delete("missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_lookups() {
        let db = test_db().await;
        active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let (_, product) = company_with_product(&db).await;

        let code = db.issuance().assign_barcode(&product.id).await.unwrap();
        let codes = db.codes();

        let by_code = codes
            .find_by_code(IdentifierKind::Barcode, &code.full_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.id, code.id);
        assert!(codes
            .find_by_code(IdentifierKind::Uln, &code.full_code)
            .await
            .unwrap()
            .is_none());

        let by_owner = codes
            .find_by_owner(IdentifierKind::Barcode, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_owner, code);
        assert_eq!(codes.get_by_id(&code.id).await.unwrap(), Some(code));
    }

    #[tokio::test]
    async fn test_bulk_items_are_independent() {
        let db = test_db().await;
        active_pool(&db, IdentifierKind::Uln, "4321", CodeKind::Upi13, None).await;
        let owners = db.owners();
        let a = owners.create_company("A").await.unwrap();
        let b = owners.create_company("B").await.unwrap();
        let c = owners.create_company("C").await.unwrap();
        db.issuance().assign_uln(&b.id).await.unwrap();

        let ids = vec![a.id.clone(), b.id.clone(), "missing".to_string(), c.id.clone()];
        let outcome = db.issuance().bulk_assign(IdentifierKind::Uln, &ids).await.unwrap();

        let succeeded: Vec<_> = outcome.succeeded.iter().map(|s| s.owner_id.as_str()).collect();
        assert_eq!(succeeded, vec![a.id.as_str(), c.id.as_str()]);

        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].owner_id, b.id);
        assert_eq!(outcome.failed[0].reason, FailureKind::AlreadyAssigned);
        assert_eq!(outcome.failed[1].reason, FailureKind::OwnerNotFound);

        assert!(owners.companies_without_uln().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_limit() {
        let db = test_db().await;
        let ids = vec!["x".to_string(); MAX_BULK_ITEMS + 1];
        let err = db
            .issuance()
            .bulk_assign(IdentifierKind::Barcode, &ids)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidInput);
    }

    struct ZeroCheck;

    impl CheckDigit for ZeroCheck {
        fn check_digit(&self, _base: &str) -> codemint_core::IssuanceResult<char> {
            Ok('0')
        }
    }

    #[tokio::test]
    async fn test_pluggable_check_digit() {
        let db = test_db().await;
        active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let (_, product) = company_with_product(&db).await;

        let code = db
            .issuance_with(Arc::new(ZeroCheck))
            .assign_barcode(&product.id)
            .await
            .unwrap();
        assert_eq!(code.full_code, "1234000000010");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_assignments_are_linearized() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("issuance.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();

        let pool = active_pool(&db, IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await;
        let company = db.owners().create_company("Acme").await.unwrap();

        let mut product_ids = Vec::new();
        for i in 0..20 {
            let product = db
                .owners()
                .create_product(&company.id, &format!("P{i}"))
                .await
                .unwrap();
            product_ids.push(product.id);
        }

        let mut handles = Vec::new();
        for product_id in product_ids {
            let issuance = db.issuance();
            handles.push(tokio::spawn(async move {
                issuance.assign_barcode(&product_id).await
            }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            let code = handle.await.unwrap().unwrap();
            sequences.push(code.sequence_slice.parse::<i64>().unwrap());
        }
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=20).collect::<Vec<i64>>());
        assert_eq!(used_count(&db, &pool.id).await, 20);
    }
}
