//! # Owner Repository
//!
//! Minimal companies and products: the owners codes are linked to.
//!
//! Everything else about these entities (addresses, pricing, billing) belongs
//! to the surrounding CRUD system; this repository only knows what issuance
//! needs: existence, the company a product belongs to, and the code link.
//!
//! ```text
//!   companies.uln_code_id ──► issued_codes.id   (kind = uln)
//!   products.barcode_id   ──► issued_codes.id   (kind = barcode)
//!   products.company_id   ──► companies.id      (barcode pool scope)
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use codemint_core::validation::validate_owner_name;
use codemint_core::{Company, IdentifierKind, IssuanceError, Product};

/// Repository for company and product rows.
#[derive(Debug, Clone)]
pub struct OwnerRepository {
    pool: SqlitePool,
}

impl OwnerRepository {
    /// Creates a new OwnerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OwnerRepository { pool }
    }

    /// Inserts a company without a ULN.
    pub async fn create_company(&self, name: &str) -> DbResult<Company> {
        validate_owner_name(name).map_err(IssuanceError::from)?;

        let now = Utc::now();
        let company = Company {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            uln_code_id: None,
            created_at: now,
            updated_at: now,
        };

        debug!(company_id = %company.id, "Inserting company");

        sqlx::query(
            r#"
            INSERT INTO companies (id, name, uln_code_id, created_at, updated_at)
            VALUES (?1, ?2, NULL, ?3, ?4)
            "#,
        )
        .bind(&company.id)
        .bind(&company.name)
        .bind(company.created_at)
        .bind(company.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(company)
    }

    /// Inserts a product without a barcode.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Company does not exist
    pub async fn create_product(&self, company_id: &str, name: &str) -> DbResult<Product> {
        validate_owner_name(name).map_err(IssuanceError::from)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            name: name.trim().to_string(),
            barcode_id: None,
            created_at: now,
            updated_at: now,
        };

        debug!(product_id = %product.id, company_id = %company_id, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, company_id, name, barcode_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, NULL, ?4, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.company_id)
        .bind(&product.name)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match DbError::from(err) {
            DbError::ForeignKeyViolation { .. } => DbError::not_found("Company", company_id),
            other => other,
        })?;

        Ok(product)
    }

    /// Gets a company by its ID.
    pub async fn get_company(&self, id: &str) -> DbResult<Option<Company>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_company_in(&mut conn, id).await
    }

    /// Gets a product by its ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_product_in(&mut conn, id).await
    }

    /// Products that currently hold no barcode, oldest first.
    ///
    /// Feeds bulk assignment after an import.
    pub async fn products_without_barcode(
        &self,
        company_id: Option<&str>,
    ) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, company_id, name, barcode_id, created_at, updated_at
            FROM products
            WHERE barcode_id IS NULL
            AND (?1 IS NULL OR company_id = ?1)
            ORDER BY created_at, id
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Companies that currently hold no ULN, oldest first.
    pub async fn companies_without_uln(&self) -> DbResult<Vec<Company>> {
        let companies = sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, uln_code_id, created_at, updated_at
            FROM companies
            WHERE uln_code_id IS NULL
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(companies)
    }

    // =========================================================================
    // Transaction-scoped helpers
    // =========================================================================

    pub(crate) async fn fetch_company_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Company>> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT id, name, uln_code_id, created_at, updated_at FROM companies WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(company)
    }

    pub(crate) async fn fetch_product_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, company_id, name, barcode_id, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(product)
    }

    /// Points the owner's code column at `code_id`.
    pub(crate) async fn set_code_link_in(
        conn: &mut SqliteConnection,
        kind: IdentifierKind,
        owner_id: &str,
        code_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let sql = match kind {
            IdentifierKind::Barcode => {
                "UPDATE products SET barcode_id = ?1, updated_at = ?2 WHERE id = ?3"
            }
            IdentifierKind::Uln => {
                "UPDATE companies SET uln_code_id = ?1, updated_at = ?2 WHERE id = ?3"
            }
        };

        let result = sqlx::query(sql)
            .bind(code_id)
            .bind(now)
            .bind(owner_id)
            .execute(conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(IssuanceError::OwnerNotFound {
                kind,
                owner_id: owner_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
