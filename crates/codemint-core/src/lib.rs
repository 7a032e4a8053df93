//! # codemint-core: Pure Issuance Logic
//!
//! This crate is the **heart** of the identifier issuance engine. It contains
//! the capacity table, the check-digit capability and the sequence allocator as
//! pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Identifier Issuance Engine                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Admin backend (onboarding, batch import)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ assign_code / create_pool / ...        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              codemint-db (transactions, SQLite)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ codemint-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ capacity  │  │ sequence  │  │ checksum  │  │ validation│  │   │
//! │  │   │ PoolSpec  │  │ allocate  │  │ Gs1Mod10  │  │ inspect   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CodePool, IssuedCode, owners, reports)
//! - [`capacity`] - The capacity table shared by every pool kind
//! - [`checksum`] - Check-digit capability
//! - [`sequence`] - Pure sequence allocation and code assembly
//! - [`validation`] - Input validation and code inspection
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use codemint_core::capacity::PoolSpec;
//! use codemint_core::{CodeKind, IdentifierKind};
//!
//! let spec = PoolSpec::new(IdentifierKind::Barcode, "1234", CodeKind::Upi13, None).unwrap();
//! assert_eq!(spec.capacity, 99_999_999);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod capacity;
pub mod checksum;
pub mod error;
pub mod sequence;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checksum::{CheckDigit, Gs1Mod10};
pub use error::{FailureKind, IssuanceError, IssuanceResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Shortest prefix any pool accepts.
pub const MIN_PREFIX_LEN: usize = 4;

/// Largest batch a single bulk assignment call accepts.
///
/// ## Business Reason
/// Every item is its own write transaction; batch imports beyond this size
/// should be chunked by the caller.
pub const MAX_BULK_ITEMS: usize = 10_000;
