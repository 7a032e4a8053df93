//! # codemint-db: Database Layer for the Issuance Engine
//!
//! This crate persists pools, issued codes and their owners in SQLite and runs
//! every code assignment as one write transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Issuance Data Flow                               │
//! │                                                                         │
//! │  Onboarding flow (assign_barcode) / admin tooling (create_pool)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   codemint-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  pool / code  │    │  (embedded)  │  │   │
//! │  │   │               │    │  owner        │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│               │    │ 001_issuance │  │   │
//! │  │   │ WriteTx       │    │ Issuance      │    │ _schema.sql  │  │   │
//! │  │   │ (txn.rs)      │◄───│ Service       │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ capacity, allocate,          │   │
//! │  │                                │ check digit                  │   │
//! │  │                                ▼                              │   │
//! │  │                          codemint-core                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  │   $CODEMINT_DB_PATH (default ./codemint.db)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - Configuration from `CODEMINT_*` environment variables
//! - [`migrations`] - Embedded database migrations
//! - [`txn`] - `BEGIN IMMEDIATE` write transactions
//! - [`issuance`] - Transactional code assignment
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (pool, code, owner)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use codemint_db::{Database, DbConfig};
//! use codemint_core::{CodeKind, IdentifierKind};
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let pool = db.pools().create(IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).await?;
//! db.pools().activate(&pool.id, None).await?;
//!
//! let code = db.issuance().assign_barcode(&product_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod issuance;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod txn;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::ConfigError;
pub use error::{DbError, DbResult};
pub use issuance::IssuanceService;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::code::CodeRepository;
pub use repository::owner::OwnerRepository;
pub use repository::pool::PoolRepository;
