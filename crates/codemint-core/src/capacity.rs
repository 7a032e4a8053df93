//! # Pool Capacity
//!
//! The single capacity table shared by barcode and ULN pools.
//!
//! ## How Capacity Is Derived
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total length = prefix + sequence field + 1 check digit                │
//! │                                                                         │
//! │  UPI13, prefix "1234":   1234 | ________ | c                            │
//! │                          4    + 8        + 1  = 13                      │
//! │                                                                         │
//! │  sequence field width w = 13 - 4 - 1 = 8                                │
//! │  capacity = 10^w - 1 = 99_999_999   (sequence 0 is never issued)        │
//! │                                                                         │
//! │  ┌──────────┬───────────────┬────────────────────────┐                 │
//! │  │ kind     │ prefix length │ capacity               │                 │
//! │  ├──────────┼───────────────┼────────────────────────┤                 │
//! │  │ UPI13    │ 4..=11        │ 99_999_999 .. 9        │                 │
//! │  │ UPI11    │ 4..=9         │ 999_999 .. 9           │                 │
//! │  │ UPI7     │ 4..=5         │ 99, 9                  │                 │
//! │  │ anything │ else          │ 0 → rejected           │                 │
//! │  └──────────┴───────────────┴────────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{IssuanceError, IssuanceResult};
use crate::types::{CodeKind, IdentifierKind};
use crate::validation::validate_prefix_digits;

/// Width of the sequence field between prefix and check digit.
///
/// Returns 0 when the prefix leaves no room for a sequence digit.
pub fn sequence_width(code_kind: CodeKind, prefix_len: usize) -> usize {
    code_kind.total_length().saturating_sub(prefix_len + 1)
}

/// Number of distinct sequence values a pool can issue.
///
/// Returns 0 for any prefix length outside the supported range; callers treat
/// 0 as an invalid configuration, never as an empty-but-valid pool.
///
/// ## Example
/// ```rust
/// use codemint_core::capacity::capacity_for;
/// use codemint_core::CodeKind;
///
/// assert_eq!(capacity_for(CodeKind::Upi13, 4), 99_999_999);
/// assert_eq!(capacity_for(CodeKind::Upi7, 5), 9);
/// assert_eq!(capacity_for(CodeKind::Upi13, 12), 0);
/// ```
pub fn capacity_for(code_kind: CodeKind, prefix_len: usize) -> i64 {
    let (min, max) = code_kind.prefix_len_range();
    if prefix_len < min || prefix_len > max {
        return 0;
    }

    let width = sequence_width(code_kind, prefix_len) as u32;
    10i64.checked_pow(width).map(|p| p - 1).unwrap_or(0)
}

// =============================================================================
// Pool Spec
// =============================================================================

/// A validated request to register a pool. Building one is the only way to
/// obtain a capacity for a new pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub kind: IdentifierKind,
    pub scope_id: Option<String>,
    pub prefix_digits: String,
    pub code_kind: CodeKind,
    pub capacity: i64,
}

impl PoolSpec {
    /// Validates the prefix/code-kind/scope combination and derives capacity.
    ///
    /// ## Errors
    /// `InvalidConfiguration` when:
    /// - the prefix is not all digits
    /// - the prefix length yields capacity 0 for `code_kind`
    /// - a ULN pool is given a scope
    pub fn new(
        kind: IdentifierKind,
        prefix_digits: &str,
        code_kind: CodeKind,
        scope_id: Option<&str>,
    ) -> IssuanceResult<Self> {
        let prefix_digits = prefix_digits.trim();

        validate_prefix_digits(prefix_digits)
            .map_err(|e| IssuanceError::invalid_config(e.to_string()))?;

        if scope_id.is_some() && !kind.allows_scope() {
            return Err(IssuanceError::invalid_config(
                "ULN pools are global and cannot be scoped to a company",
            ));
        }

        let capacity = capacity_for(code_kind, prefix_digits.len());
        if capacity == 0 {
            let (min, max) = code_kind.prefix_len_range();
            return Err(IssuanceError::invalid_config(format!(
                "{:?} needs a prefix of {}..={} digits, got {}",
                code_kind,
                min,
                max,
                prefix_digits.len()
            )));
        }

        Ok(PoolSpec {
            kind,
            scope_id: scope_id.map(str::to_string),
            prefix_digits: prefix_digits.to_string(),
            code_kind,
            capacity,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
