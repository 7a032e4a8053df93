//! # Domain Types
//!
//! Core domain types used throughout the issuance engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    CodePool     │   │   IssuedCode    │   │ Product/Company │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  prefix_digits  │◄──│  pool_id (FK)   │   │  barcode_id     │       │
//! │  │  code_kind      │   │  owner_id       │──►│  uln_code_id    │       │
//! │  │  capacity       │   │  sequence_slice │   │  (owner link)   │       │
//! │  │  used_count     │   │  full_code      │   └─────────────────┘       │
//! │  │  next_sequence  │   │  is_deleted     │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │ IdentifierKind  │   │    CodeKind     │                             │
//! │  │  Barcode        │   │  UPI7  (7)      │                             │
//! │  │  Uln            │   │  UPI11 (11)     │                             │
//! │  └─────────────────┘   │  UPI13 (13)     │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Code Layout
//! ```text
//!   full_code = prefix_digits | zero-padded sequence | check digit
//!   1234000000015  =  "1234"  |  "00000001"          |  "5"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::FailureKind;
use crate::MIN_PREFIX_LEN;

// =============================================================================
// Identifier Kind
// =============================================================================

/// Which family of identifier a pool issues, and which owner it links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Product barcode, linked through `products.barcode_id`.
    Barcode,
    /// Company ULN, linked through `companies.uln_code_id`. Always drawn from a global pool.
    Uln,
}

impl IdentifierKind {
    /// Whether pools of this kind may be scoped to a company.
    #[inline]
    pub const fn allows_scope(&self) -> bool {
        matches!(self, IdentifierKind::Barcode)
    }
}

// =============================================================================
// Code Kind
// =============================================================================

/// Fixed-length code class. The number is the total digit count,
/// check digit included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodeKind {
    Upi7,
    Upi11,
    Upi13,
}

impl CodeKind {
    /// Total digits of a finished code.
    #[inline]
    pub const fn total_length(&self) -> usize {
        match self {
            CodeKind::Upi7 => 7,
            CodeKind::Upi11 => 11,
            CodeKind::Upi13 => 13,
        }
    }

    /// Maps a total digit count back to its code kind.
    pub const fn from_total_length(len: usize) -> Option<Self> {
        match len {
            7 => Some(CodeKind::Upi7),
            11 => Some(CodeKind::Upi11),
            13 => Some(CodeKind::Upi13),
            _ => None,
        }
    }

    /// Longest prefix that still leaves one sequence digit and the check digit.
    #[inline]
    pub const fn max_prefix_len(&self) -> usize {
        self.total_length() - 2
    }

    /// Supported prefix lengths, inclusive.
    #[inline]
    pub const fn prefix_len_range(&self) -> (usize, usize) {
        (MIN_PREFIX_LEN, self.max_prefix_len())
    }
}

// =============================================================================
// Code Pool
// =============================================================================

/// A registered prefix with its fixed capacity and allocation counters.
///
/// ## Invariants
/// - `used_count <= capacity`
/// - `next_sequence == used_count + 1`
/// - `capacity` never changes after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CodePool {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub kind: IdentifierKind,

    /// Company this pool belongs to. `None` = global pool.
    pub scope_id: Option<String>,

    /// Registered prefix, 4..=total-2 digits.
    pub prefix_digits: String,

    pub code_kind: CodeKind,

    pub is_active: bool,

    /// Distinct sequence values this pool can ever issue.
    pub capacity: i64,

    pub used_count: i64,

    /// Sequence the next allocation will take (1-based).
    pub next_sequence: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CodePool {
    /// Codes this pool can still issue.
    #[inline]
    pub fn remaining_capacity(&self) -> i64 {
        self.capacity - self.used_count
    }

    /// Whether every sequence has been issued.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.capacity
    }

    /// Width of the sequence field for this pool's layout.
    #[inline]
    pub fn sequence_width(&self) -> usize {
        crate::capacity::sequence_width(self.code_kind, self.prefix_digits.len())
    }

    /// Share of capacity already issued, 0.0..=100.0 (display only).
    pub fn utilization_percent(&self) -> f64 {
        if self.capacity <= 0 {
            return 0.0;
        }
        (self.used_count as f64 / self.capacity as f64) * 100.0
    }
}

// =============================================================================
// Issued Code
// =============================================================================

/// A code drawn from a pool and linked to exactly one owner.
///
/// Never physically deleted: `is_deleted` retires it while keeping
/// `full_code` reserved forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct IssuedCode {
    pub id: String,
    pub kind: IdentifierKind,
    /// Product id (barcodes) or company id (ULNs).
    pub owner_id: String,
    pub pool_id: String,
    /// Zero-padded sequence field as persisted.
    pub sequence_slice: String,
    pub full_code: String,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Owners
// =============================================================================

/// A company: scope for barcode pools, owner of a ULN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub uln_code_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A product: owner of a barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub barcode_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Allocation
// =============================================================================

/// Result of drawing one sequence from a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// The sequence number taken.
    pub sequence: i64,
    /// `sequence` left-padded to the pool's field width.
    pub padded_sequence: String,
    /// The pool with counters advanced, as it must be persisted.
    pub updated_pool: CodePool,
}

// =============================================================================
// Assignment Stage
// =============================================================================

/// Progress of one issuance attempt.
///
/// ```text
/// Started → PoolResolved → SequenceAllocated → ChecksumComputed
///         → Persisted → Linked → Committed
///
/// any failure ──► RolledBack (nothing observable)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStage {
    Started,
    PoolResolved,
    SequenceAllocated,
    ChecksumComputed,
    Persisted,
    Linked,
    Committed,
    RolledBack,
}

// =============================================================================
// Reports
// =============================================================================

/// One row of a capacity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PoolCapacity {
    pub pool: CodePool,
    pub remaining_capacity: i64,
    pub utilization_percent: f64,
}

impl From<CodePool> for PoolCapacity {
    fn from(pool: CodePool) -> Self {
        PoolCapacity {
            remaining_capacity: pool.remaining_capacity(),
            utilization_percent: pool.utilization_percent(),
            pool,
        }
    }
}

/// Live code count for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PoolCodeCount {
    pub pool_id: String,
    pub prefix_digits: String,
    pub code_kind: CodeKind,
    pub active_codes: i64,
}

/// Issued-code totals for a kind, optionally narrowed to one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CodeReport {
    pub total_codes: i64,
    pub active_codes: i64,
    pub deleted_codes: i64,
    pub by_pool: Vec<PoolCodeCount>,
}

// =============================================================================
// Bulk Assignment
// =============================================================================

/// A successful item of a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AssignedCode {
    pub owner_id: String,
    pub full_code: String,
}

/// A failed item of a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FailedAssignment {
    pub owner_id: String,
    pub reason: FailureKind,
}

/// Outcome of a bulk run. Items are independent of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkAssignment {
    pub succeeded: Vec<AssignedCode>,
    pub failed: Vec<FailedAssignment>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: i64, used_count: i64) -> CodePool {
        let now = Utc::now();
        CodePool {
            id: "pool-1".to_string(),
            kind: IdentifierKind::Barcode,
            scope_id: None,
            prefix_digits: "12345".to_string(),
            code_kind: CodeKind::Upi7,
            is_active: true,
            capacity,
            used_count,
            next_sequence: used_count + 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_code_kind_lengths() {
        assert_eq!(CodeKind::Upi13.total_length(), 13);
        assert_eq!(CodeKind::from_total_length(11), Some(CodeKind::Upi11));
        assert_eq!(CodeKind::from_total_length(12), None);
        assert_eq!(CodeKind::Upi7.prefix_len_range(), (4, 5));
        assert_eq!(CodeKind::Upi13.prefix_len_range(), (4, 11));
    }

    #[test]
    fn test_code_kind_serializes_like_stored_value() {
        let json = serde_json::to_string(&CodeKind::Upi13).unwrap();
        assert_eq!(json, "\"UPI13\"");
    }

    #[test]
    fn test_pool_capacity_figures() {
        let p = pool(9, 3);
        assert_eq!(p.remaining_capacity(), 6);
        assert!(!p.is_exhausted());
        assert_eq!(p.sequence_width(), 1);
        assert!((p.utilization_percent() - 33.333).abs() < 0.01);

        let full = pool(9, 9);
        assert!(full.is_exhausted());
        assert_eq!(PoolCapacity::from(full).remaining_capacity, 0);
    }

    #[test]
    fn test_only_barcode_pools_take_scope() {
        assert!(IdentifierKind::Barcode.allows_scope());
        assert!(!IdentifierKind::Uln.allows_scope());
    }
}
