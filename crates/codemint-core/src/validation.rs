//! # Validation Module
//!
//! Input validation utilities for the issuance engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin backend (TypeScript)                                   │
//! │  ├── Request shape, auth                                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Prefix digits, ids, names                                         │
//! │  └── Code inspection (length class + check digit)                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (kind, prefix_digits), UNIQUE (kind, full_code)            │
//! │  ├── one active pool per (kind, scope)                                 │
//! │  └── CHECK used_count <= capacity                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::checksum::{CheckDigit, Gs1Mod10};
use crate::error::{IssuanceError, IssuanceResult, ValidationError};
use crate::types::CodeKind;
use crate::MIN_PREFIX_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest prefix any code kind accepts.
const MAX_PREFIX_LEN: usize = CodeKind::Upi13.max_prefix_len();

// =============================================================================
// Prefix
// =============================================================================

/// Validates the digits of a pool prefix.
///
/// ## Rules
/// - Must not be empty
/// - ASCII digits only
/// - 4..=11 characters (the per-kind upper bound is enforced by the capacity table)
///
/// ## Example
/// ```rust
/// use codemint_core::validation::validate_prefix_digits;
///
/// assert!(validate_prefix_digits("8901").is_ok());
/// assert!(validate_prefix_digits("89O1").is_err());
/// assert!(validate_prefix_digits("890").is_err());
/// ```
pub fn validate_prefix_digits(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "prefix".to_string(),
        });
    }

    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "prefix".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    if prefix.len() < MIN_PREFIX_LEN {
        return Err(ValidationError::TooShort {
            field: "prefix".to_string(),
            min: MIN_PREFIX_LEN,
        });
    }

    if prefix.len() > MAX_PREFIX_LEN {
        return Err(ValidationError::TooLong {
            field: "prefix".to_string(),
            max: MAX_PREFIX_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Names
// =============================================================================

/// Validates a product or company display name.
pub fn validate_owner_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Code Inspection
// =============================================================================

/// A code split into its structural parts.
///
/// Which digits are prefix and which are sequence depends on the pool; that
/// split needs a registry lookup and is done by the database layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CodeInspection {
    pub code_kind: CodeKind,
    /// Everything but the check digit.
    pub base_code: String,
    pub check_digit: char,
}

/// Checks a scanned or typed code: digits only, a known length, and a
/// matching check digit.
///
/// ## Example
/// ```rust
/// use codemint_core::validation::inspect_code;
/// use codemint_core::CodeKind;
///
/// let parts = inspect_code("1234000000015").unwrap();
/// assert_eq!(parts.code_kind, CodeKind::Upi13);
/// assert!(inspect_code("1234000000016").is_err());
/// ```
pub fn inspect_code(code: &str) -> IssuanceResult<CodeInspection> {
    let code = code.trim();

    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IssuanceError::MalformedCode {
            kind: None,
            reason: "must contain only digits".to_string(),
        });
    }

    let code_kind =
        CodeKind::from_total_length(code.len()).ok_or_else(|| IssuanceError::MalformedCode {
            kind: None,
            reason: format!("length {} is not 7, 11 or 13", code.len()),
        })?;

    if !Gs1Mod10.verify(code)? {
        return Err(IssuanceError::MalformedCode {
            kind: Some(code_kind),
            reason: "check digit mismatch".to_string(),
        });
    }

    let (base, check) = code.split_at(code.len() - 1);
    Ok(CodeInspection {
        code_kind,
        base_code: base.to_string(),
        check_digit: check.chars().next().unwrap_or('0'),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prefix_digits() {
        assert!(validate_prefix_digits("1234").is_ok());
        assert!(validate_prefix_digits("12345678901").is_ok());

        assert!(validate_prefix_digits("").is_err());
        assert!(validate_prefix_digits("123").is_err());
        assert!(validate_prefix_digits("123456789012").is_err());
        assert!(validate_prefix_digits("12-4").is_err());
    }

    #[test]
    fn test_prefix_bound_follows_longest_code_kind() {
        let longest = [CodeKind::Upi7, CodeKind::Upi11, CodeKind::Upi13]
            .iter()
            .map(CodeKind::max_prefix_len)
            .max()
            .unwrap();
        assert_eq!(MAX_PREFIX_LEN, longest);
        assert!(validate_prefix_digits(&"1".repeat(longest)).is_ok());
        assert!(validate_prefix_digits(&"1".repeat(longest + 1)).is_err());
    }

    #[test]
    fn test_validate_owner_name() {
        assert!(validate_owner_name("Acme Foods").is_ok());
        assert!(validate_owner_name("   ").is_err());
        assert!(validate_owner_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_inspect_code() {
        let parts = inspect_code("4006381333931").unwrap();
        assert_eq!(parts.code_kind, CodeKind::Upi13);
        assert_eq!(parts.base_code, "400638133393");
        assert_eq!(parts.check_digit, '1');

        assert!(matches!(
            inspect_code("4006381333932"),
            Err(IssuanceError::MalformedCode { kind: Some(CodeKind::Upi13), .. })
        ));
        assert!(matches!(
            inspect_code("400638133393"),
            Err(IssuanceError::MalformedCode { kind: None, .. })
        ));
        assert!(inspect_code("40063813x3931").is_err());
    }
}
