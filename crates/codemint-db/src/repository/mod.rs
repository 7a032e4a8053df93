//! # Repository Module
//!
//! Database repository implementations for the issuance engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Admin tooling / onboarding flow                                       │
//! │       │                                                                 │
//! │       │  db.pools().activate(&pool_id, None)                           │
//! │       │  db.issuance().assign_barcode(&product_id)                     │
//! │       ▼                                                                 │
//! │  PoolRepository     CodeRepository     OwnerRepository                 │
//! │  ├── create         ├── find_by_code   ├── create_company              │
//! │  ├── activate       ├── find_by_owner  ├── create_product              │
//! │  ├── capacity_report├── soft_delete    └── products_without_barcode    │
//! │  └── ...            └── code_report                                    │
//! │       │                                                                 │
//! │       │  `*_in(conn, ..)` helpers run on the caller's write            │
//! │       │  transaction; IssuanceService composes them                    │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PoolRepository`](pool::PoolRepository) - Prefix pools, activation, capacity
//! - [`CodeRepository`](code::CodeRepository) - Issued code lookups, soft delete, reports
//! - [`OwnerRepository`](owner::OwnerRepository) - Companies and products

pub mod code;
pub mod owner;
pub mod pool;
