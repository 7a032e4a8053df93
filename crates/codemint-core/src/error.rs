//! # Error Types
//!
//! Domain-specific error types for codemint-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  codemint-core errors (this file)                                      │
//! │  ├── IssuanceError    - Business + integrity failures of issuance      │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── FailureKind      - Serializable kind handed back to callers       │
//! │                                                                         │
//! │  codemint-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures, wraps IssuanceError          │
//! │                                                                         │
//! │  Flow: ValidationError → IssuanceError → DbError → FailureKind         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (pool id, owner id, code)
//! 3. Errors are enum variants, never String
//! 4. Callers translate [`FailureKind`] into end-user text; this crate never does

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::types::{CodeKind, IdentifierKind};

// =============================================================================
// Issuance Error
// =============================================================================

/// Errors raised while configuring pools or issuing codes.
///
/// Variants fall in two groups:
/// - **business outcomes** (`OwnerNotFound`, `AlreadyAssigned`, `NoActivePool`,
///   `CapacityExhausted`, ...) are expected and surface to the caller as-is
/// - **integrity faults** (`SequenceOverflow`, `DuplicateCode`,
///   `CorruptCounters`) mean a pool/code invariant has been violated
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// Prefix/code-kind combination has no capacity.
    ///
    /// ## When This Occurs
    /// - Prefix length outside the supported range for the code kind
    /// - Prefix contains non-digit characters
    /// - A ULN pool was given an owner scope (ULN pools are global)
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Checksum input was not a non-empty digit string.
    #[error("Invalid checksum input: {0:?}")]
    InvalidInput(String),

    /// Pool id does not exist (or not within the requested scope).
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    /// Pool has issued codes and can no longer be removed.
    #[error("Pool {pool_id} has issued {used_count} codes and cannot be deleted")]
    PoolInUse { pool_id: String, used_count: i64 },

    /// Prefix digits already registered for this identifier kind.
    #[error("Prefix {prefix} is already registered for {kind:?} pools")]
    PrefixTaken { kind: IdentifierKind, prefix: String },

    /// Owning product or company does not exist.
    #[error("{kind:?} owner not found: {owner_id}")]
    OwnerNotFound {
        kind: IdentifierKind,
        owner_id: String,
    },

    /// Owner already holds a live code of this kind.
    #[error("{kind:?} owner {owner_id} already has code {existing_code}")]
    AlreadyAssigned {
        kind: IdentifierKind,
        owner_id: String,
        existing_code: String,
    },

    /// No active pool could be resolved for the owner's scope.
    #[error("No active {kind:?} pool for scope {scope_id:?}")]
    NoActivePool {
        kind: IdentifierKind,
        scope_id: Option<String>,
    },

    /// The pool has issued every sequence its digit budget allows.
    #[error("Pool {pool_id} exhausted: {used_count} of {capacity} codes issued")]
    CapacityExhausted {
        pool_id: String,
        capacity: i64,
        used_count: i64,
    },

    /// Sequence number does not fit the field width.
    ///
    /// Unreachable while capacity accounting is correct.
    #[error("Sequence {sequence} does not fit {width} digits in pool {pool_id}")]
    SequenceOverflow {
        pool_id: String,
        sequence: i64,
        width: usize,
    },

    /// A freshly built code already exists (live or soft-deleted).
    #[error("Code {full_code} was already issued")]
    DuplicateCode { full_code: String },

    /// Pool counters violate `next_sequence == used_count + 1`.
    #[error("Pool {pool_id} counters out of step: used {used_count}, next {next_sequence}")]
    CorruptCounters {
        pool_id: String,
        used_count: i64,
        next_sequence: i64,
    },

    /// Code does not decompose into a known layout.
    #[error("Malformed {kind:?} code: {reason}")]
    MalformedCode {
        kind: Option<CodeKind>,
        reason: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl IssuanceError {
    /// Creates an InvalidConfiguration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        IssuanceError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Machine-readable kind of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            IssuanceError::InvalidConfiguration { .. } => FailureKind::InvalidConfiguration,
            IssuanceError::InvalidInput(_) => FailureKind::InvalidInput,
            IssuanceError::PoolNotFound(_) => FailureKind::PoolNotFound,
            IssuanceError::PoolInUse { .. } => FailureKind::PoolInUse,
            IssuanceError::PrefixTaken { .. } => FailureKind::PrefixTaken,
            IssuanceError::OwnerNotFound { .. } => FailureKind::OwnerNotFound,
            IssuanceError::AlreadyAssigned { .. } => FailureKind::AlreadyAssigned,
            IssuanceError::NoActivePool { .. } => FailureKind::NoActivePool,
            IssuanceError::CapacityExhausted { .. } => FailureKind::CapacityExhausted,
            IssuanceError::SequenceOverflow { .. } => FailureKind::SequenceOverflow,
            IssuanceError::DuplicateCode { .. } => FailureKind::DuplicateCode,
            IssuanceError::CorruptCounters { .. } => FailureKind::CorruptCounters,
            IssuanceError::MalformedCode { .. } => FailureKind::InvalidInput,
            IssuanceError::Validation(_) => FailureKind::InvalidInput,
        }
    }
}

// =============================================================================
// Failure Kind
// =============================================================================

/// Serializable error kind returned to callers (bulk results, admin tooling).
///
/// ```text
/// ┌────────────────────────┬───────────┬────────────────────────────────────┐
/// │ kind                   │ retryable │ meaning                            │
/// ├────────────────────────┼───────────┼────────────────────────────────────┤
/// │ InvalidConfiguration   │ no        │ fix the prefix / code kind         │
/// │ OwnerNotFound          │ no        │ product or company missing         │
/// │ AlreadyAssigned        │ no        │ owner holds a live code            │
/// │ NoActivePool           │ no        │ activate a pool first              │
/// │ CapacityExhausted      │ no        │ create + activate a new pool       │
/// │ SequenceOverflow       │ no        │ INTEGRITY FAULT - alert            │
/// │ DuplicateCode          │ no        │ INTEGRITY FAULT - alert            │
/// │ CorruptCounters        │ no        │ INTEGRITY FAULT - alert            │
/// │ StorageConflict        │ yes       │ lock contention, re-run the call   │
/// │ Storage                │ no        │ any other database failure         │
/// └────────────────────────┴───────────┴────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidConfiguration,
    InvalidInput,
    PoolNotFound,
    PoolInUse,
    PrefixTaken,
    OwnerNotFound,
    AlreadyAssigned,
    NoActivePool,
    CapacityExhausted,
    SequenceOverflow,
    DuplicateCode,
    CorruptCounters,
    StorageConflict,
    Storage,
}

impl FailureKind {
    /// Whether re-running the whole unit of work may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::StorageConflict)
    }

    /// Whether this kind means a pool or code invariant was violated.
    pub const fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            FailureKind::SequenceOverflow | FailureKind::DuplicateCode | FailureKind::CorruptCounters
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before any pool or code logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Collection has more items than allowed.
    #[error("{field} must have at most {max} items")]
    TooMany { field: String, max: usize },

    /// Invalid format (e.g., invalid UUID, non-digit prefix).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with IssuanceError.
pub type IssuanceResult<T> = Result<T, IssuanceError>;

// =============================================================================
// Unit Tests
// =============================================================================
